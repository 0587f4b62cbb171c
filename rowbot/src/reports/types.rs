use serde::{Deserialize, Serialize};

/// Collection of job reports.
pub const JOB_REPORT_COLLECTION: &str = "rowbot-report";

/// Collection of query reports.
pub const QUERY_REPORT_COLLECTION: &str = "rowbot-query-report";

/// Collection of insert batch reports.
pub const INSERT_REPORT_COLLECTION: &str = "rowbot-insert-report";

/// Final outcome of a single document write, retries included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResult {
    pub success: bool,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InsertResult {
    pub fn succeeded(uri: impl Into<String>) -> Self {
        Self {
            success: true,
            uri: uri.into(),
            message: None,
        }
    }

    pub fn failed(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            uri: uri.into(),
            message: Some(message.into()),
        }
    }
}

/// Outcome of one query, written once when the query finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReport {
    pub success: bool,
    pub query_id: String,
    pub query: String,
    /// Rows streamed and handed to the insert pool, also on failure.
    pub total_rows: u64,
    /// Elapsed seconds.
    pub query_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A batch of insert outcomes of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertBatchReport {
    pub timestamp: String,
    pub query_id: String,
    pub batch_id: String,
    pub results: Vec<InsertResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Started,
    Complete,
    Error,
}

/// Job level report, written when the job starts and again when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    pub timestamp: String,
    pub status: JobStatus,
    /// Seconds since the job started.
    pub total_runtime: f64,
    pub query_report_uris: Vec<String>,
    pub insert_report_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
