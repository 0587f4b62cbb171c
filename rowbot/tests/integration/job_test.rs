use rowbot::destination::memory::MemoryDocumentStore;
use rowbot::error::ErrorKind;
use rowbot::job::Job;
use rowbot::reports::types::JobStatus;
use rowbot::source::memory::{MemoryConnector, MemoryDatabase, MemoryResult};
use rowbot::test_utils::failing_store::FailingDocumentStore;
use rowbot_telemetry::tracing::init_test_tracing;
use serde_json::json;

use crate::support::{
    MAIN_DATABASE, insert_batch_reports, job_config, people, query_report, row_document_uris,
};

#[tokio::test(flavor = "multi_thread")]
async fn two_queries_write_one_document_per_row() {
    init_test_tracing();

    let connector = MemoryConnector::new().with_database(
        MAIN_DATABASE,
        MemoryDatabase::new()
            .with_result("select * from customers", MemoryResult::rows(people(3)))
            .with_result("select * from suppliers", MemoryResult::rows(people(3))),
    );
    let config = job_config(json!({
        "queries": [
            {
                "queryId": "customers",
                "query": "select * from customers",
                "database": "main",
                "collections": ["customers"]
            },
            {
                "queryId": "suppliers",
                "query": "select * from suppliers",
                "database": "main",
                "collections": ["suppliers"]
            }
        ]
    }));
    let store = MemoryDocumentStore::new();

    let report = Job::new(config, connector.clone(), store.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Complete);
    assert_eq!(report.query_report_uris.len(), 2);
    assert_eq!(report.insert_report_uris.len(), 2);

    for query_id in ["customers", "suppliers"] {
        let query = query_report(&store, &report, query_id).await;
        assert!(query.success);
        assert_eq!(query.total_rows, 3);
        assert!(query.query_time >= 0.0);

        let uris = row_document_uris(&store, query_id).await;
        let expected: Vec<String> = (1..=3)
            .map(|sequence| format!("/rowbot/{}/{query_id}/{sequence}.json", report.timestamp))
            .collect();
        assert_eq!(uris, expected);

        let stored = store.document(&uris[0]).await.unwrap();
        assert_eq!(stored.collections, vec![query_id.to_string()]);
    }

    let document = store
        .json(&format!("/rowbot/{}/customers/2.json", report.timestamp))
        .await
        .unwrap();
    assert_eq!(document, json!({"id": "2", "name": "person 2"}));

    assert!(store.uris_matching(|uri| uri.contains("/binary/")).await.is_empty());

    // Every query opens its own connection, and the job closes all of them.
    assert_eq!(connector.connects(), 2);
    assert_eq!(connector.closes(), 2);

    let stored_report = store
        .json(&format!("/rowbot/{}/rowbot-report.json", report.timestamp))
        .await
        .unwrap();
    assert_eq!(stored_report["status"], "complete");
    assert_eq!(stored_report["jobName"], "integration");
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_connection_fails_only_its_query() {
    init_test_tracing();

    let connector = MemoryConnector::new()
        .with_database(
            MAIN_DATABASE,
            MemoryDatabase::new()
                .with_result("select * from customers", MemoryResult::rows(people(2))),
        )
        .with_database(
            "memory://archive",
            MemoryDatabase::unreachable("archive is offline"),
        );
    let config = job_config(json!({
        "connections": [
            {"key": "main", "connectionString": MAIN_DATABASE},
            {"key": "archive", "connectionString": "memory://archive"}
        ],
        "queries": [
            {"queryId": "customers", "query": "select * from customers", "database": "main"},
            {"queryId": "old_orders", "query": "select * from orders", "database": "archive"}
        ]
    }));
    let store = MemoryDocumentStore::new();

    let report = Job::new(config, connector, store.clone()).run().await.unwrap();

    assert_eq!(report.status, JobStatus::Complete);

    let failed = query_report(&store, &report, "old_orders").await;
    assert!(!failed.success);
    assert_eq!(failed.total_rows, 0);
    assert!(failed.message.unwrap().contains("archive is offline"));
    assert!(row_document_uris(&store, "old_orders").await.is_empty());
    assert!(insert_batch_reports(&store, "old_orders").await.is_empty());

    let succeeded = query_report(&store, &report, "customers").await;
    assert!(succeeded.success);
    assert_eq!(row_document_uris(&store, "customers").await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_results_are_flushed_in_batches() {
    init_test_tracing();

    let connector = MemoryConnector::new().with_database(
        MAIN_DATABASE,
        MemoryDatabase::new().with_result("select * from customers", MemoryResult::rows(people(5))),
    );
    let config = job_config(json!({
        "insertReportBatchSize": 2,
        "queries": [
            {"queryId": "customers", "query": "select * from customers", "database": "main"}
        ]
    }));
    let store = MemoryDocumentStore::new();

    let report = Job::new(config, connector, store.clone()).run().await.unwrap();

    let batches = insert_batch_reports(&store, "customers").await;
    let mut sizes: Vec<usize> = batches.iter().map(|batch| batch.results.len()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![1, 2, 2]);
    assert_eq!(report.insert_report_uris.len(), 3);

    let mut uris: Vec<String> = batches
        .iter()
        .flat_map(|batch| batch.results.iter().map(|result| result.uri.clone()))
        .collect();
    uris.sort();
    uris.dedup();
    assert_eq!(uris.len(), 5);

    for batch in &batches {
        assert_eq!(batch.query_id, "customers");
        assert_eq!(batch.timestamp, report.timestamp);
        assert!(batch.results.iter().all(|result| result.success));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_streamed_before_a_query_failure_are_still_written() {
    init_test_tracing();

    let connector = MemoryConnector::new().with_database(
        MAIN_DATABASE,
        MemoryDatabase::new().with_result(
            "select * from customers",
            MemoryResult::rows(people(5)).fail_after(3, "server closed the connection"),
        ),
    );
    let config = job_config(json!({
        "queries": [
            {"queryId": "customers", "query": "select * from customers", "database": "main"}
        ]
    }));
    let store = MemoryDocumentStore::new();

    let report = Job::new(config, connector, store.clone()).run().await.unwrap();

    assert_eq!(report.status, JobStatus::Complete);

    let query = query_report(&store, &report, "customers").await;
    assert!(!query.success);
    assert_eq!(query.total_rows, 3);
    assert!(
        query
            .message
            .unwrap()
            .contains("server closed the connection")
    );
    assert_eq!(row_document_uris(&store, "customers").await.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_writes_are_reported_without_failing_the_job() {
    init_test_tracing();

    let connector = MemoryConnector::new().with_database(
        MAIN_DATABASE,
        MemoryDatabase::new().with_result("select * from customers", MemoryResult::rows(people(3))),
    );
    let config = job_config(json!({
        "queries": [
            {"queryId": "customers", "query": "select * from customers", "database": "main"}
        ]
    }));
    let store = FailingDocumentStore::wrap(MemoryDocumentStore::new());
    store.fail_always(|uri| uri.ends_with("/customers/2.json"));
    store.fail_first(1, |uri| uri.ends_with("/customers/3.json"));

    let report = Job::new(config, connector, store.clone()).run().await.unwrap();

    assert_eq!(report.status, JobStatus::Complete);

    let failed_uri = format!("/rowbot/{}/customers/2.json", report.timestamp);
    let retried_uri = format!("/rowbot/{}/customers/3.json", report.timestamp);
    assert_eq!(store.attempts(&failed_uri), 2);
    assert_eq!(store.attempts(&retried_uri), 2);

    let batches = insert_batch_reports(store.inner(), "customers").await;
    let results: Vec<_> = batches.iter().flat_map(|batch| batch.results.iter()).collect();
    assert_eq!(results.len(), 3);

    let failed = results
        .iter()
        .find(|result| result.uri == failed_uri)
        .unwrap();
    assert!(!failed.success);
    assert!(failed.message.as_deref().unwrap().contains("Injected write failure"));

    let retried = results
        .iter()
        .find(|result| result.uri == retried_uri)
        .unwrap();
    assert!(retried.success);
    assert!(store.inner().document(&retried_uri).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_query_ids_are_generated() {
    init_test_tracing();

    let connector = MemoryConnector::new().with_database(
        MAIN_DATABASE,
        MemoryDatabase::new().with_result("select * from customers", MemoryResult::rows(people(1))),
    );
    let config = job_config(json!({
        "uriPrefix": "/exports",
        "queries": [{"query": "select * from customers", "database": "main"}]
    }));
    let store = MemoryDocumentStore::new();

    let report = Job::new(config, connector, store.clone()).run().await.unwrap();

    assert_eq!(report.query_report_uris.len(), 1);
    let query_report_uri = &report.query_report_uris[0];
    let prefix = format!("/exports/{}/", report.timestamp);
    let query_id = query_report_uri
        .strip_prefix(&prefix)
        .and_then(|rest| rest.strip_suffix("/rowbot-query-report.json"))
        .unwrap();
    assert!(uuid::Uuid::parse_str(query_id).is_ok());

    let query = store.json(query_report_uri).await.unwrap();
    assert_eq!(query["queryId"], query_id);
    assert!(
        store
            .document(&format!("{prefix}{query_id}/1.json"))
            .await
            .is_some()
    );
    assert!(
        store
            .document(&format!("/exports/{}/rowbot-report.json", report.timestamp))
            .await
            .is_some()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_job_document_ends_in_an_error_report() {
    init_test_tracing();

    let config = job_config(json!({
        "queries": [
            {"queryId": "customers", "query": "select * from customers", "database": "main"},
            {"queryId": "customers", "query": "select * from suppliers", "database": "main"}
        ]
    }));
    let store = MemoryDocumentStore::new();
    let connector = MemoryConnector::new();

    let err = Job::new(config, connector.clone(), store.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(connector.connects(), 0);

    let reports = store
        .uris_matching(|uri| uri.ends_with("/rowbot-report.json"))
        .await;
    assert_eq!(reports.len(), 1);

    let report = store.json(&reports[0]).await.unwrap();
    assert_eq!(report["status"], "error");
    assert!(report["message"].as_str().unwrap().contains("customers"));
    assert_eq!(report["queryReportUris"], json!([]));
}
