use rowbot_config::shared::QueryConfig;
use uuid::Uuid;

/// A query ready to run, with its id fixed for the lifetime of the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub query_id: String,
    pub query: String,
    /// Key of the connection the query runs against.
    pub connection_key: String,
    /// Collections the row documents of this query are tagged with.
    pub collections: Vec<String>,
    /// Start timestamp of the job, shared by every URI the query produces.
    pub timestamp: String,
}

impl QuerySpec {
    /// Resolves a configured query, generating a UUID when no id was supplied.
    pub fn from_config(config: &QueryConfig, timestamp: &str) -> Self {
        let query_id = config
            .query_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            query_id,
            query: config.query.clone(),
            connection_key: config.database.clone(),
            collections: config.collections.clone(),
            timestamp: timestamp.to_string(),
        }
    }
}
