use bytes::Bytes;
use rowbot::destination::base::Document;
use rowbot::destination::memory::MemoryDocumentStore;
use rowbot::job::Job;
use rowbot::source::memory::{MemoryConnector, MemoryDatabase, MemoryResult};
use rowbot::test_utils::failing_store::FailingDocumentStore;
use rowbot::types::{CellValue, SourceRow};
use rowbot::workers::insert::BINARY_REFERENCE_PREFIX;
use rowbot_telemetry::tracing::init_test_tracing;
use serde_json::json;

use crate::support::{MAIN_DATABASE, insert_batch_reports, job_config, query_report};

fn contracts() -> MemoryConnector {
    let rows = vec![
        SourceRow::new(vec![
            ("id".to_string(), CellValue::Text("1".to_string())),
            ("scan".to_string(), CellValue::Binary(Bytes::from_static(b"%PDF-1.7"))),
            ("note".to_string(), CellValue::Null),
        ]),
        SourceRow::new(vec![
            ("id".to_string(), CellValue::Text("2".to_string())),
            ("scan".to_string(), CellValue::Null),
            ("note".to_string(), CellValue::Text("unsigned".to_string())),
        ]),
    ];

    MemoryConnector::new().with_database(
        MAIN_DATABASE,
        MemoryDatabase::new().with_result("select * from contracts", MemoryResult::rows(rows)),
    )
}

fn contracts_config() -> rowbot_config::shared::JobConfig {
    job_config(json!({
        "queries": [{
            "queryId": "contracts",
            "query": "select * from contracts",
            "database": "main",
            "collections": ["contracts"]
        }]
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn binary_columns_become_referenced_documents() {
    init_test_tracing();

    let store = MemoryDocumentStore::new();

    let report = Job::new(contracts_config(), contracts(), store.clone())
        .run()
        .await
        .unwrap();

    let root = format!("/rowbot/{}/contracts", report.timestamp);
    let first = store.json(&format!("{root}/1.json")).await.unwrap();
    let reference = first["scan"].as_str().unwrap();
    let binary_id = reference.strip_prefix(BINARY_REFERENCE_PREFIX).unwrap();
    assert_eq!(first["id"], "1");
    assert!(first.get("note").is_none());

    let binary = store
        .document(&format!("{root}/binary/{binary_id}"))
        .await
        .unwrap();
    assert_eq!(binary.document, Document::Binary(Bytes::from_static(b"%PDF-1.7")));
    assert_eq!(binary.collections, vec!["contracts".to_string()]);

    let second = store.json(&format!("{root}/2.json")).await.unwrap();
    assert_eq!(second, json!({"id": "2", "note": "unsigned"}));

    assert_eq!(
        store.uris_matching(|uri| uri.contains("/binary/")).await.len(),
        1
    );

    // One result per written document: two rows and one binary column.
    let batches = insert_batch_reports(&store, "contracts").await;
    let results: usize = batches.iter().map(|batch| batch.results.len()).sum();
    assert_eq!(results, 3);

    let query = query_report(&store, &report, "contracts").await;
    assert_eq!(query.total_rows, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_binary_writes_leave_no_reference() {
    init_test_tracing();

    let store = FailingDocumentStore::wrap(MemoryDocumentStore::new());
    store.fail_always(|uri| uri.contains("/binary/"));

    let report = Job::new(contracts_config(), contracts(), store.clone())
        .run()
        .await
        .unwrap();

    let root = format!("/rowbot/{}/contracts", report.timestamp);
    let first = store.inner().json(&format!("{root}/1.json")).await.unwrap();
    assert_eq!(first, json!({"id": "1"}));
    assert!(
        store
            .inner()
            .uris_matching(|uri| uri.contains("/binary/"))
            .await
            .is_empty()
    );

    let batches = insert_batch_reports(store.inner(), "contracts").await;
    let failed: Vec<_> = batches
        .iter()
        .flat_map(|batch| batch.results.iter())
        .filter(|result| !result.success)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].uri.starts_with(&format!("{root}/binary/")));
    assert!(failed[0].message.is_some());
}
