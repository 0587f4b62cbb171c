use futures::TryStreamExt;
use metrics::counter;
use rowbot_config::shared::ConnectionConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span};

use crate::bail;
use crate::concurrency::pool::WorkerPool;
use crate::destination::base::DocumentStore;
use crate::error::{ErrorKind, EtlResult};
use crate::metrics::{
    OUTCOME_LABEL, QUERY_ID_LABEL, ROWBOT_QUERIES_TOTAL, ROWBOT_ROWS_STREAMED_TOTAL,
};
use crate::reports::types::QueryReport;
use crate::reports::writer::ReportWriter;
use crate::source::base::{SourceConnection, SourceConnector};
use crate::source::registry::ConnectionRegistry;
use crate::types::QuerySpec;
use crate::workers::base::TaskHandler;
use crate::workers::insert::InsertTask;

#[derive(Debug, Clone)]
pub struct QueryTask {
    pub query: Arc<QuerySpec>,
}

/// Runs queries and feeds their rows to the insert pool.
///
/// Each query runs on a connection of its own, registered for the job to close at the end.
///
/// Rows are numbered from 1 in the order the cursor returns them. A row is counted once it was
/// accepted by the insert pool, so a query failing halfway reports the rows that will still be
/// written. Every query ends with exactly one [`QueryReport`], whatever happened.
pub struct QueryWorker<S: SourceConnector, D> {
    connector: Arc<S>,
    connections: Arc<HashMap<String, ConnectionConfig>>,
    registry: Arc<ConnectionRegistry<S::Connection>>,
    insert_pool: Arc<WorkerPool<InsertTask>>,
    reports: Arc<ReportWriter<D>>,
}

impl<S, D> QueryWorker<S, D>
where
    S: SourceConnector,
    D: DocumentStore + Send + Sync + 'static,
{
    pub fn new(
        connector: Arc<S>,
        connections: Arc<HashMap<String, ConnectionConfig>>,
        registry: Arc<ConnectionRegistry<S::Connection>>,
        insert_pool: Arc<WorkerPool<InsertTask>>,
        reports: Arc<ReportWriter<D>>,
    ) -> Self {
        Self {
            connector,
            connections,
            registry,
            insert_pool,
            reports,
        }
    }

    async fn run_query(&self, query: Arc<QuerySpec>) {
        info!("query started");
        let started = Instant::now();

        let mut total_rows = 0;
        let outcome = self.stream_rows(&query, &mut total_rows).await;
        let query_time = started.elapsed().as_secs_f64();

        let report = match outcome {
            Ok(()) => {
                info!(total_rows, query_time, "query complete");

                QueryReport {
                    success: true,
                    query_id: query.query_id.clone(),
                    query: query.query.clone(),
                    total_rows,
                    query_time,
                    message: None,
                }
            }
            Err(err) => {
                error!(total_rows, error = %err, "query failed");

                QueryReport {
                    success: false,
                    query_id: query.query_id.clone(),
                    query: query.query.clone(),
                    total_rows,
                    query_time,
                    message: Some(err.summary()),
                }
            }
        };

        let outcome = if report.success { "success" } else { "failure" };
        counter!(ROWBOT_QUERIES_TOTAL, OUTCOME_LABEL => outcome).increment(1);

        self.reports.write_query_report(&report).await;
    }

    async fn stream_rows(&self, query: &Arc<QuerySpec>, total_rows: &mut u64) -> EtlResult<()> {
        let connection = self.connection(&query.connection_key).await?;
        let mut rows = connection.query(&query.query).await?;

        while let Some(row) = rows.try_next().await? {
            let sequence = *total_rows + 1;
            self.insert_pool
                .submit(InsertTask {
                    row,
                    query: query.clone(),
                    sequence,
                })
                .await?;

            *total_rows = sequence;
            counter!(ROWBOT_ROWS_STREAMED_TOTAL, QUERY_ID_LABEL => query.query_id.clone())
                .increment(1);
        }

        Ok(())
    }

    async fn connection(&self, key: &str) -> EtlResult<Arc<S::Connection>> {
        let Some(config) = self.connections.get(key) else {
            bail!(
                ErrorKind::ConfigError,
                "Unknown connection key",
                key.to_string()
            );
        };

        let connection = self.connector.connect(config).await?;

        Ok(self.registry.register(key, connection).await)
    }
}

impl<S, D> TaskHandler<QueryTask> for QueryWorker<S, D>
where
    S: SourceConnector,
    D: DocumentStore + Send + Sync + 'static,
{
    async fn handle(&self, task: QueryTask) {
        let span = info_span!(
            "query",
            query_id = %task.query.query_id,
            connection = %task.query.connection_key
        );

        self.run_query(task.query).instrument(span).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::destination::memory::MemoryDocumentStore;
    use crate::destination::retry::{RetryPolicy, RetryingWriter};
    use crate::reports::accumulator::ReportAccumulator;
    use crate::source::memory::{MemoryConnector, MemoryDatabase, MemoryResult};
    use crate::types::{CellValue, SourceRow, UriLayout};
    use crate::workers::insert::InsertWorker;

    struct Harness {
        store: MemoryDocumentStore,
        connector: Arc<MemoryConnector>,
        worker: QueryWorker<MemoryConnector, MemoryDocumentStore>,
        insert_pool: Arc<WorkerPool<InsertTask>>,
        registry: Arc<ConnectionRegistry<<MemoryConnector as SourceConnector>::Connection>>,
    }

    fn harness(connector: MemoryConnector) -> Harness {
        let store = MemoryDocumentStore::new();
        let writer = RetryingWriter::new(
            Arc::new(store.clone()),
            RetryPolicy::new(1, Duration::ZERO),
        );
        let reports = Arc::new(ReportWriter::new(writer, UriLayout::new("/rowbot/", "ts")));
        let accumulator = Arc::new(ReportAccumulator::new(reports.clone(), 100));
        let insert_pool = Arc::new(WorkerPool::start(
            "insert",
            2,
            4,
            Arc::new(InsertWorker::new(reports.clone(), accumulator)),
        ));

        let connections = HashMap::from([(
            "main".to_string(),
            ConnectionConfig {
                key: "main".to_string(),
                connection_string: "memory://main".to_string(),
                properties: Default::default(),
            },
        )]);
        let connector = Arc::new(connector);
        let registry = Arc::new(ConnectionRegistry::new());
        let worker = QueryWorker::new(
            connector.clone(),
            Arc::new(connections),
            registry.clone(),
            insert_pool.clone(),
            reports,
        );

        Harness {
            store,
            connector,
            worker,
            insert_pool,
            registry,
        }
    }

    fn task(query_id: &str, sql: &str, connection_key: &str) -> QueryTask {
        QueryTask {
            query: Arc::new(QuerySpec {
                query_id: query_id.to_string(),
                query: sql.to_string(),
                connection_key: connection_key.to_string(),
                collections: vec![],
                timestamp: "ts".to_string(),
            }),
        }
    }

    fn rows(count: usize) -> Vec<SourceRow> {
        (1..=count)
            .map(|id| SourceRow::new(vec![("id".to_string(), CellValue::Text(id.to_string()))]))
            .collect()
    }

    async fn query_report(store: &MemoryDocumentStore, query_id: &str) -> QueryReport {
        let uri = format!("/rowbot/ts/{query_id}/rowbot-query-report.json");
        serde_json::from_value(store.json(&uri).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn streams_every_row_to_the_insert_pool() {
        let connector = MemoryConnector::new().with_database(
            "memory://main",
            MemoryDatabase::new().with_result("select id from t", MemoryResult::rows(rows(5))),
        );
        let harness = harness(connector);

        harness
            .worker
            .handle(task("q1", "select id from t", "main"))
            .await;
        harness.insert_pool.shutdown().await;
        harness.insert_pool.wait_terminated().await;

        let report = query_report(&harness.store, "q1").await;
        assert!(report.success);
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.query, "select id from t");
        assert!(report.message.is_none());

        for sequence in 1..=5 {
            let document = harness
                .store
                .json(&format!("/rowbot/ts/q1/{sequence}.json"))
                .await
                .unwrap();
            assert_eq!(document["id"], sequence.to_string());
        }
    }

    #[tokio::test]
    async fn reports_connection_failures() {
        let connector = MemoryConnector::new()
            .with_database("memory://main", MemoryDatabase::unreachable("connection refused"));
        let harness = harness(connector);

        harness.worker.handle(task("q1", "select 1", "main")).await;

        let report = query_report(&harness.store, "q1").await;
        assert!(!report.success);
        assert_eq!(report.total_rows, 0);
        assert!(report.message.unwrap().contains("connection refused"));
        assert!(harness.registry.is_empty().await);
    }

    #[tokio::test]
    async fn reports_rows_streamed_before_a_failure() {
        let connector = MemoryConnector::new().with_database(
            "memory://main",
            MemoryDatabase::new().with_result(
                "select id from t",
                MemoryResult::rows(rows(5)).fail_after(3, "cursor lost"),
            ),
        );
        let harness = harness(connector);

        harness
            .worker
            .handle(task("q1", "select id from t", "main"))
            .await;
        harness.insert_pool.shutdown().await;
        harness.insert_pool.wait_terminated().await;

        let report = query_report(&harness.store, "q1").await;
        assert!(!report.success);
        assert_eq!(report.total_rows, 3);
        assert!(report.message.unwrap().contains("cursor lost"));
        assert!(harness.store.document("/rowbot/ts/q1/3.json").await.is_some());
        assert!(harness.store.document("/rowbot/ts/q1/4.json").await.is_none());
    }

    #[tokio::test]
    async fn each_query_opens_its_own_connection() {
        let connector = MemoryConnector::new().with_database(
            "memory://main",
            MemoryDatabase::new()
                .with_result("select 1", MemoryResult::rows(rows(1)))
                .with_result("select 2", MemoryResult::rows(rows(2))),
        );
        let harness = harness(connector);

        harness.worker.handle(task("q1", "select 1", "main")).await;
        harness.worker.handle(task("q2", "select 2", "main")).await;

        assert_eq!(harness.connector.connects(), 2);
        assert_eq!(harness.registry.len().await, 2);
        assert_eq!(harness.registry.close_all().await, 2);
        assert_eq!(harness.connector.closes(), 2);
    }

    #[tokio::test]
    async fn reports_unknown_connection_keys() {
        let harness = harness(MemoryConnector::new());

        harness.worker.handle(task("q1", "select 1", "missing")).await;

        let report = query_report(&harness.store, "q1").await;
        assert!(!report.success);
        assert!(report.message.unwrap().contains("Unknown connection key"));
    }
}
