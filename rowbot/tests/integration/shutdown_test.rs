use rowbot::destination::base::{Document, DocumentStore};
use rowbot::destination::memory::MemoryDocumentStore;
use rowbot::error::EtlResult;
use rowbot::job::Job;
use rowbot::reports::types::JobStatus;
use rowbot::source::memory::{MemoryConnector, MemoryDatabase, MemoryResult};
use rowbot_telemetry::tracing::init_test_tracing;
use serde_json::json;
use std::time::Duration;

use crate::support::{MAIN_DATABASE, job_config, people, query_report, row_document_uris};

/// Store that takes a while for every write, so that producers outrun it.
#[derive(Debug, Clone)]
struct SlowStore {
    inner: MemoryDocumentStore,
    delay: Duration,
}

impl DocumentStore for SlowStore {
    fn name() -> &'static str {
        "slow"
    }

    async fn write(&self, uri: &str, document: &Document, collections: &[String]) -> EtlResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.write(uri, document, collections).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_queries_are_drained_before_inserts_stop() {
    init_test_tracing();

    let slow = MemoryResult::rows(people(10)).with_row_delay(Duration::from_millis(5));
    let connector = MemoryConnector::new().with_database(
        MAIN_DATABASE,
        MemoryDatabase::new()
            .with_result("select * from a", slow.clone())
            .with_result("select * from b", slow.clone())
            .with_result("select * from c", slow),
    );
    let config = job_config(json!({
        "queryThreads": 1,
        "insertThreads": 1,
        "queryQueueSize": 1,
        "insertQueueSize": 1,
        "pollIntervalMs": 1,
        "queries": [
            {"queryId": "a", "query": "select * from a", "database": "main"},
            {"queryId": "b", "query": "select * from b", "database": "main"},
            {"queryId": "c", "query": "select * from c", "database": "main"}
        ]
    }));
    let store = MemoryDocumentStore::new();

    let report = Job::new(config, connector, store.clone()).run().await.unwrap();

    assert_eq!(report.status, JobStatus::Complete);
    for query_id in ["a", "b", "c"] {
        let query = query_report(&store, &report, query_id).await;
        assert!(query.success);
        assert_eq!(query.total_rows, 10);
        assert_eq!(row_document_uris(&store, query_id).await.len(), 10);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_store_holds_back_queries_without_losing_rows() {
    init_test_tracing();

    let connector = MemoryConnector::new().with_database(
        MAIN_DATABASE,
        MemoryDatabase::new()
            .with_result("select * from a", MemoryResult::rows(people(20)))
            .with_result("select * from b", MemoryResult::rows(people(20))),
    );
    let config = job_config(json!({
        "insertThreads": 2,
        "insertQueueSize": 2,
        "queries": [
            {"queryId": "a", "query": "select * from a", "database": "main"},
            {"queryId": "b", "query": "select * from b", "database": "main"}
        ]
    }));
    let store = MemoryDocumentStore::new();
    let slow = SlowStore {
        inner: store.clone(),
        delay: Duration::from_millis(2),
    };

    let report = Job::new(config, connector, slow).run().await.unwrap();

    assert_eq!(report.status, JobStatus::Complete);
    for query_id in ["a", "b"] {
        let query = query_report(&store, &report, query_id).await;
        assert_eq!(query.total_rows, 20);
        assert_eq!(row_document_uris(&store, query_id).await.len(), 20);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn job_without_queries_completes() {
    init_test_tracing();

    let store = MemoryDocumentStore::new();

    let report = Job::new(job_config(json!({})), MemoryConnector::new(), store.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Complete);
    assert!(report.query_report_uris.is_empty());
    assert!(report.insert_report_uris.is_empty());
    assert_eq!(store.documents().await.len(), 1);
}
