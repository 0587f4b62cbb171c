use metrics::counter;
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::destination::base::DocumentStore;
use crate::metrics::{QUERY_ID_LABEL, ROWBOT_BATCH_REPORTS_FLUSHED_TOTAL};
use crate::reports::types::{InsertBatchReport, InsertResult};
use crate::reports::writer::ReportWriter;

/// Buffers insert outcomes per query and writes them as insert batch reports.
///
/// A buffer is detached in the same critical section that sees it reach the threshold, so each
/// outcome ends up in exactly one batch even when many insert workers record concurrently. The
/// batch report itself is written after the lock is released.
#[derive(Debug)]
pub struct ReportAccumulator<D> {
    reports: Arc<ReportWriter<D>>,
    threshold: usize,
    buffers: Mutex<HashMap<String, Vec<InsertResult>>>,
}

impl<D> ReportAccumulator<D>
where
    D: DocumentStore + Send + Sync,
{
    pub fn new(reports: Arc<ReportWriter<D>>, threshold: usize) -> Self {
        Self {
            reports,
            threshold: threshold.max(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Records one outcome, flushing the query's buffer when it reaches the threshold.
    pub async fn record(&self, query_id: &str, result: InsertResult) {
        let full_batch = {
            let mut buffers = self.buffers.lock().await;
            let buffer = buffers.entry(query_id.to_string()).or_default();
            buffer.push(result);

            if buffer.len() >= self.threshold {
                Some(mem::take(buffer))
            } else {
                None
            }
        };

        if let Some(results) = full_batch {
            self.flush(query_id, results).await;
        }
    }

    /// Flushes every non-empty buffer.
    pub async fn flush_all(&self) {
        let mut pending: Vec<(String, Vec<InsertResult>)> = {
            let mut buffers = self.buffers.lock().await;
            buffers
                .drain()
                .filter(|(_, results)| !results.is_empty())
                .collect()
        };
        pending.sort_by(|(a, _), (b, _)| a.cmp(b));

        info!(buffers = pending.len(), "flushing remaining insert results");

        for (query_id, results) in pending {
            self.flush(&query_id, results).await;
        }
    }

    /// Returns how many outcomes of `query_id` are waiting for a flush.
    pub async fn buffered(&self, query_id: &str) -> usize {
        self.buffers
            .lock()
            .await
            .get(query_id)
            .map_or(0, Vec::len)
    }

    async fn flush(&self, query_id: &str, results: Vec<InsertResult>) {
        let report = InsertBatchReport {
            timestamp: self.reports.layout().timestamp().to_string(),
            query_id: query_id.to_string(),
            batch_id: Uuid::new_v4().to_string(),
            results,
        };

        debug!(
            query_id,
            batch_id = %report.batch_id,
            results = report.results.len(),
            "flushing insert batch report"
        );

        self.reports.write_insert_batch_report(&report).await;

        counter!(ROWBOT_BATCH_REPORTS_FLUSHED_TOTAL, QUERY_ID_LABEL => query_id.to_string())
            .increment(1);
    }
}
