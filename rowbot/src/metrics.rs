//! Metric names emitted by rowbot.

/// Label for the query id in metrics.
pub const QUERY_ID_LABEL: &str = "query_id";

/// Label for the kind of written document (`json` or `binary`).
pub const DOCUMENT_KIND_LABEL: &str = "document_kind";

/// Label for the outcome of a write (`success` or `failure`).
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for the pool a metric refers to (`query` or `insert`).
pub const POOL_LABEL: &str = "pool";

/// Counter of rows streamed from source queries.
pub const ROWBOT_ROWS_STREAMED_TOTAL: &str = "rowbot_rows_streamed_total";

/// Counter of queries finished, labelled by outcome.
pub const ROWBOT_QUERIES_TOTAL: &str = "rowbot_queries_total";

/// Counter of documents written, labelled by document kind and outcome.
pub const ROWBOT_DOCUMENTS_WRITTEN_TOTAL: &str = "rowbot_documents_written_total";

/// Counter of write attempts that failed and were retried.
pub const ROWBOT_WRITE_RETRIES_TOTAL: &str = "rowbot_write_retries_total";

/// Histogram of the time spent on a logical write, retries included, in seconds.
pub const ROWBOT_WRITE_DURATION_SECONDS: &str = "rowbot_write_duration_seconds";

/// Counter of insert batch reports flushed.
pub const ROWBOT_BATCH_REPORTS_FLUSHED_TOTAL: &str = "rowbot_batch_reports_flushed_total";

/// Gauge of tasks currently running in a pool.
pub const ROWBOT_POOL_ACTIVE_TASKS: &str = "rowbot_pool_active_tasks";

/// Gauge of tasks waiting in a pool's queue.
pub const ROWBOT_POOL_QUEUED_TASKS: &str = "rowbot_pool_queued_tasks";
