use metrics::{counter, histogram};
use rowbot_config::shared::WriteRetryConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::destination::base::{Document, DocumentStore};
use crate::metrics::{
    DOCUMENT_KIND_LABEL, OUTCOME_LABEL, ROWBOT_DOCUMENTS_WRITTEN_TOTAL,
    ROWBOT_WRITE_DURATION_SECONDS, ROWBOT_WRITE_RETRIES_TOTAL,
};
use crate::reports::types::InsertResult;

/// How often and how patiently a write is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never zero.
    pub max_attempts: u32,
    /// Fixed delay between two attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        (&WriteRetryConfig::default()).into()
    }
}

impl From<&WriteRetryConfig> for RetryPolicy {
    fn from(config: &WriteRetryConfig) -> Self {
        RetryPolicy::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }
}

/// Writes documents to a [`DocumentStore`] under a [`RetryPolicy`].
///
/// Every write path of a job goes through this type. It never returns an error: the outcome of
/// a write, after the last attempt, is an [`InsertResult`] carrying the last error message.
#[derive(Debug)]
pub struct RetryingWriter<D> {
    store: Arc<D>,
    policy: RetryPolicy,
}

impl<D> Clone for RetryingWriter<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policy: self.policy,
        }
    }
}

impl<D> RetryingWriter<D>
where
    D: DocumentStore + Send + Sync,
{
    pub fn new(store: Arc<D>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn write(
        &self,
        uri: &str,
        document: &Document,
        collections: &[String],
    ) -> InsertResult {
        let started = Instant::now();
        let document_kind = match document {
            Document::Json(_) => "json",
            Document::Binary(_) => "binary",
        };

        let mut attempt = 1;
        let result = loop {
            match self.store.write(uri, document, collections).await {
                Ok(()) => {
                    debug!(uri, attempt, "document written");
                    break InsertResult::succeeded(uri);
                }
                Err(err) if attempt < self.policy.max_attempts => {
                    warn!(
                        uri,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %err.summary(),
                        "document write failed, retrying"
                    );
                    counter!(ROWBOT_WRITE_RETRIES_TOTAL).increment(1);

                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        uri,
                        attempts = attempt,
                        store = D::name(),
                        error = %err,
                        "document write failed, giving up"
                    );
                    break InsertResult::failed(uri, err.summary());
                }
            }
        };

        let outcome = if result.success { "success" } else { "failure" };
        counter!(
            ROWBOT_DOCUMENTS_WRITTEN_TOTAL,
            DOCUMENT_KIND_LABEL => document_kind,
            OUTCOME_LABEL => outcome
        )
        .increment(1);
        histogram!(ROWBOT_WRITE_DURATION_SECONDS, DOCUMENT_KIND_LABEL => document_kind)
            .record(started.elapsed().as_secs_f64());

        result
    }
}
