use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::destination::base::{Document, DocumentStore};
use crate::error::EtlError;
use crate::reports::accumulator::ReportAccumulator;
use crate::reports::types::InsertResult;
use crate::reports::writer::ReportWriter;
use crate::types::{CellValue, QuerySpec, SourceRow};
use crate::workers::base::TaskHandler;

/// Prefix of the value that replaces a binary column in a row document.
pub const BINARY_REFERENCE_PREFIX: &str = "BINARY:";

/// One row to be written, with its 1-based position in the query's results.
#[derive(Debug, Clone)]
pub struct InsertTask {
    pub row: SourceRow,
    pub query: Arc<QuerySpec>,
    pub sequence: u64,
}

/// Writes rows as documents.
///
/// Each binary column becomes a document of its own under `binary/<id>`, referenced from the
/// row document as `"BINARY:<id>"`. The other non-null columns are written as a JSON object in
/// column order, and null columns are left out. Every write outcome goes to the
/// [`ReportAccumulator`]. The documents of a row are written independently of each other, so a
/// row can end up partially written.
#[derive(Debug)]
pub struct InsertWorker<D> {
    reports: Arc<ReportWriter<D>>,
    accumulator: Arc<ReportAccumulator<D>>,
}

impl<D> InsertWorker<D>
where
    D: DocumentStore + Send + Sync + 'static,
{
    pub fn new(reports: Arc<ReportWriter<D>>, accumulator: Arc<ReportAccumulator<D>>) -> Self {
        Self {
            reports,
            accumulator,
        }
    }

    async fn insert_row(&self, task: InsertTask) {
        let InsertTask {
            row,
            query,
            sequence,
        } = task;
        let layout = self.reports.layout();
        let writer = self.reports.writer();

        let mut fields = Map::new();
        for (name, value) in row.into_columns() {
            match value {
                CellValue::Null => {}
                CellValue::Text(text) => {
                    fields.insert(name, Value::String(text));
                }
                CellValue::Binary(bytes) => {
                    let binary_id = Uuid::new_v4().to_string();
                    let uri = layout.binary_document(&query.query_id, &binary_id);

                    let result = writer
                        .write(&uri, &Document::Binary(bytes), &query.collections)
                        .await;

                    // A reference is only kept when the document it points to exists.
                    if result.success {
                        fields.insert(
                            name,
                            Value::String(format!("{BINARY_REFERENCE_PREFIX}{binary_id}")),
                        );
                    } else {
                        warn!(
                            query_id = %query.query_id,
                            sequence,
                            column = %name,
                            "binary column left out of row document, its write failed"
                        );
                    }

                    self.accumulator.record(&query.query_id, result).await;
                }
            }
        }

        let uri = layout.row_document(&query.query_id, sequence);
        let result = match serde_json::to_string(&Value::Object(fields)) {
            Ok(json) => {
                writer
                    .write(&uri, &Document::Json(json), &query.collections)
                    .await
            }
            Err(err) => InsertResult::failed(&uri, EtlError::from(err).summary()),
        };

        debug!(uri, success = result.success, "row written");

        self.accumulator.record(&query.query_id, result).await;
    }
}

impl<D> TaskHandler<InsertTask> for InsertWorker<D>
where
    D: DocumentStore + Send + Sync + 'static,
{
    async fn handle(&self, task: InsertTask) {
        self.insert_row(task).await;
    }
}
