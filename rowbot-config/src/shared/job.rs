use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::shared::{ValidationError, WriteRetryConfig};

/// Errors that can occur while reading a job document.
#[derive(Debug, Error)]
pub enum JobConfigError {
    /// The job document could not be read from disk.
    #[error("failed to read job document `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The job document is not valid JSON or misses required fields.
    #[error("failed to parse job document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A source database connection declared by a job.
///
/// Queries refer to a connection through its [`ConnectionConfig::key`].
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Logical key of the connection, unique within the job.
    pub key: String,
    /// Driver connection string, either `key=value` pairs or a URL.
    pub connection_string: String,
    /// Driver properties such as credentials, applied on top of the connection string.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Connection strings and properties routinely carry credentials.
        f.debug_struct("ConnectionConfig")
            .field("key", &self.key)
            .field("connection_string", &"REDACTED")
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A single SQL query of a job.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Caller supplied id. A UUID is generated at submission time when absent.
    #[serde(default)]
    pub query_id: Option<String>,
    /// The SQL text.
    pub query: String,
    /// Key of the [`ConnectionConfig`] the query runs against.
    pub database: String,
    /// Collections every row document of this query is tagged with.
    #[serde(default)]
    pub collections: Vec<String>,
}

/// A rowbot job document.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking connection
/// credentials into serialized forms.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Number of queries running concurrently.
    pub query_threads: usize,
    /// Number of row inserts running concurrently.
    pub insert_threads: usize,
    #[serde(default)]
    pub job_name: Option<String>,
    /// Prefix of every document URI written by the job.
    #[serde(default = "default_uri_prefix")]
    pub uri_prefix: String,
    #[serde(default, rename = "type")]
    pub job_type: Option<String>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    pub queries: Vec<QueryConfig>,
    /// Capacity of the queue in front of the query workers.
    #[serde(default = "default_query_queue_size")]
    pub query_queue_size: usize,
    /// Capacity of the queue in front of the insert workers.
    #[serde(default = "default_insert_queue_size")]
    pub insert_queue_size: usize,
    /// Number of insert outcomes collected per query before a batch report is written.
    #[serde(default = "default_insert_report_batch_size")]
    pub insert_report_batch_size: usize,
    #[serde(default)]
    pub write_retry: WriteRetryConfig,
    /// How often the coordinator checks the pools.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How often the coordinator logs the pools' occupancy.
    #[serde(default = "default_status_log_interval_ms")]
    pub status_log_interval_ms: u64,
}

impl JobConfig {
    /// Default URI prefix.
    pub const DEFAULT_URI_PREFIX: &'static str = "/rowbot/";

    /// Default capacity of the query queue.
    pub const DEFAULT_QUERY_QUEUE_SIZE: usize = 100_000;

    /// Default capacity of the insert queue.
    pub const DEFAULT_INSERT_QUEUE_SIZE: usize = 100_000;

    /// Default threshold of the insert report batches.
    pub const DEFAULT_INSERT_REPORT_BATCH_SIZE: usize = 10_000;

    /// Default coordinator poll interval.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

    /// Default coordinator status log interval.
    pub const DEFAULT_STATUS_LOG_INTERVAL_MS: u64 = 5_000;

    /// Parses a job document.
    ///
    /// Only the shape of the document is checked here. [`JobConfig::validate`] runs once the
    /// job has started, so that an invalid job still leaves an error report behind.
    pub fn from_json_str(document: &str) -> Result<Self, JobConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Validates the job document.
    ///
    /// Checks sizing fields, connection key uniqueness, that every query points to a declared
    /// connection and that explicit query ids are unique.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let positive_fields = [
            ("queryThreads", self.query_threads),
            ("insertThreads", self.insert_threads),
            ("queryQueueSize", self.query_queue_size),
            ("insertQueueSize", self.insert_queue_size),
            ("insertReportBatchSize", self.insert_report_batch_size),
        ];
        for (field, value) in positive_fields {
            if value == 0 {
                return Err(ValidationError::invalid_field(
                    field,
                    "must be greater than 0",
                ));
            }
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::invalid_field(
                "pollIntervalMs",
                "must be greater than 0",
            ));
        }

        self.write_retry.validate()?;

        let mut connection_keys = HashSet::new();
        for connection in &self.connections {
            if !connection_keys.insert(connection.key.as_str()) {
                return Err(ValidationError::DuplicateConnectionKey(
                    connection.key.clone(),
                ));
            }
        }

        let mut query_ids = HashSet::new();
        for (index, query) in self.queries.iter().enumerate() {
            let label = query
                .query_id
                .clone()
                .unwrap_or_else(|| format!("#{}", index + 1));

            if query.query.trim().is_empty() {
                return Err(ValidationError::invalid_field(
                    &format!("queries[{index}].query"),
                    "must not be empty",
                ));
            }

            if !connection_keys.contains(query.database.as_str()) {
                return Err(ValidationError::UnknownConnectionKey {
                    query: label,
                    key: query.database.clone(),
                });
            }

            if let Some(query_id) = &query.query_id
                && !query_ids.insert(query_id.as_str())
            {
                return Err(ValidationError::DuplicateQueryId(query_id.clone()));
            }
        }

        Ok(())
    }
}

/// Reads and parses the job document at `path`, without validating it.
pub fn load_job_config(path: &Path) -> Result<JobConfig, JobConfigError> {
    let document = fs::read_to_string(path).map_err(|source| JobConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    JobConfig::from_json_str(&document)
}

fn default_uri_prefix() -> String {
    JobConfig::DEFAULT_URI_PREFIX.to_string()
}

fn default_query_queue_size() -> usize {
    JobConfig::DEFAULT_QUERY_QUEUE_SIZE
}

fn default_insert_queue_size() -> usize {
    JobConfig::DEFAULT_INSERT_QUEUE_SIZE
}

fn default_insert_report_batch_size() -> usize {
    JobConfig::DEFAULT_INSERT_REPORT_BATCH_SIZE
}

fn default_poll_interval_ms() -> u64 {
    JobConfig::DEFAULT_POLL_INTERVAL_MS
}

fn default_status_log_interval_ms() -> u64 {
    JobConfig::DEFAULT_STATUS_LOG_INTERVAL_MS
}
