use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::destination::base::{Document, DocumentStore};
use crate::destination::retry::RetryingWriter;
use crate::error::EtlError;
use crate::reports::types::{
    INSERT_REPORT_COLLECTION, InsertBatchReport, InsertResult, JOB_REPORT_COLLECTION, JobReport,
    QUERY_REPORT_COLLECTION, QueryReport,
};
use crate::types::UriLayout;

/// Writes report documents and remembers the URIs of the query and batch reports.
///
/// The URI lists only grow, and a URI is added only once its report was actually stored, so the
/// final job report never links to a document that does not exist.
#[derive(Debug)]
pub struct ReportWriter<D> {
    writer: RetryingWriter<D>,
    layout: UriLayout,
    query_report_uris: Mutex<Vec<String>>,
    insert_report_uris: Mutex<Vec<String>>,
}

impl<D> ReportWriter<D>
where
    D: DocumentStore + Send + Sync,
{
    pub fn new(writer: RetryingWriter<D>, layout: UriLayout) -> Self {
        Self {
            writer,
            layout,
            query_report_uris: Mutex::new(Vec::new()),
            insert_report_uris: Mutex::new(Vec::new()),
        }
    }

    pub fn layout(&self) -> &UriLayout {
        &self.layout
    }

    pub fn writer(&self) -> &RetryingWriter<D> {
        &self.writer
    }

    /// Writes the job report at the job's fixed URI, replacing any earlier version.
    pub async fn write_job_report(&self, report: &JobReport) -> InsertResult {
        let uri = self.layout.job_report();
        let result = self.write_json(&uri, report, JOB_REPORT_COLLECTION).await;

        if result.success {
            info!(uri, status = ?report.status, "job report written");
        }

        result
    }

    pub async fn write_query_report(&self, report: &QueryReport) -> InsertResult {
        let uri = self.layout.query_report(&report.query_id);
        let result = self.write_json(&uri, report, QUERY_REPORT_COLLECTION).await;

        if result.success {
            self.query_report_uris.lock().await.push(uri);
        }

        result
    }

    pub async fn write_insert_batch_report(&self, report: &InsertBatchReport) -> InsertResult {
        let uri = self
            .layout
            .insert_batch_report(&report.query_id, &report.batch_id);
        let result = self.write_json(&uri, report, INSERT_REPORT_COLLECTION).await;

        if result.success {
            self.insert_report_uris.lock().await.push(uri);
        }

        result
    }

    pub async fn query_report_uris(&self) -> Vec<String> {
        self.query_report_uris.lock().await.clone()
    }

    pub async fn insert_report_uris(&self) -> Vec<String> {
        self.insert_report_uris.lock().await.clone()
    }

    async fn write_json<S: Serialize>(
        &self,
        uri: &str,
        report: &S,
        collection: &str,
    ) -> InsertResult {
        let json = match serde_json::to_string(report) {
            Ok(json) => json,
            Err(err) => {
                let err = EtlError::from(err);
                error!(uri, error = %err, "report could not be serialized");
                return InsertResult::failed(uri, err.summary());
            }
        };

        let result = self
            .writer
            .write(uri, &Document::Json(json), &[collection.to_string()])
            .await;

        if !result.success {
            error!(
                uri,
                message = result.message.as_deref().unwrap_or_default(),
                "report could not be written"
            );
        }

        result
    }
}
