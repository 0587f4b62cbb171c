use chrono::{DateTime, Utc};

/// Job timestamp format: UTC with millisecond precision, e.g. `2024-03-01T09:30:00.125Z`.
const JOB_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub const JOB_REPORT_FILE: &str = "rowbot-report.json";
pub const QUERY_REPORT_FILE: &str = "rowbot-query-report.json";
pub const INSERT_REPORT_FILE: &str = "rowbot-insert-report.json";

/// Formats the start time of a job the way it appears in URIs and reports.
pub fn format_job_timestamp(at: DateTime<Utc>) -> String {
    at.format(JOB_TIMESTAMP_FORMAT).to_string()
}

/// Builds the URIs of every document a job writes.
///
/// All URIs live under `<prefix><timestamp>/`, so two runs of the same job never overwrite each
/// other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriLayout {
    prefix: String,
    timestamp: String,
}

impl UriLayout {
    /// Creates a layout, appending a trailing `/` to `prefix` when missing.
    pub fn new(prefix: &str, timestamp: impl Into<String>) -> Self {
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        Self {
            prefix,
            timestamp: timestamp.into(),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn job_report(&self) -> String {
        format!("{}{}/{JOB_REPORT_FILE}", self.prefix, self.timestamp)
    }

    pub fn query_report(&self, query_id: &str) -> String {
        format!("{}/{QUERY_REPORT_FILE}", self.query_root(query_id))
    }

    pub fn insert_batch_report(&self, query_id: &str, batch_id: &str) -> String {
        format!("{}/{batch_id}/{INSERT_REPORT_FILE}", self.query_root(query_id))
    }

    /// URI of the document of the row with the 1-based `sequence` number.
    pub fn row_document(&self, query_id: &str, sequence: u64) -> String {
        format!("{}/{sequence}.json", self.query_root(query_id))
    }

    pub fn binary_document(&self, query_id: &str, binary_id: &str) -> String {
        format!("{}/binary/{binary_id}", self.query_root(query_id))
    }

    fn query_root(&self, query_id: &str) -> String {
        format!("{}{}/{query_id}", self.prefix, self.timestamp)
    }
}
