use rowbot::destination::memory::MemoryDocumentStore;
use rowbot::reports::types::{InsertBatchReport, JobReport, QueryReport};
use rowbot::types::{CellValue, SourceRow};
use rowbot_config::shared::JobConfig;

/// Connection string of the scripted database most tests use.
pub const MAIN_DATABASE: &str = "memory://main";

/// Builds a job document with small poll intervals and a fast retry policy.
///
/// `overrides` is merged into the defaults, so tests only spell out what they care about. The
/// document is not validated here, the job does that.
pub fn job_config(overrides: serde_json::Value) -> JobConfig {
    let mut document = serde_json::json!({
        "jobName": "integration",
        "queryThreads": 2,
        "insertThreads": 2,
        "pollIntervalMs": 5,
        "statusLogIntervalMs": 50,
        "writeRetry": {"maxAttempts": 2, "backoffMs": 1},
        "connections": [{"key": "main", "connectionString": MAIN_DATABASE}],
        "queries": []
    });

    if let (Some(document), Some(overrides)) = (document.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            document.insert(key.clone(), value.clone());
        }
    }

    serde_json::from_value(document).unwrap()
}

/// Rows with an `id` column counting from 1 and a `name` column.
pub fn people(count: usize) -> Vec<SourceRow> {
    (1..=count)
        .map(|id| {
            SourceRow::new(vec![
                ("id".to_string(), CellValue::Text(id.to_string())),
                ("name".to_string(), CellValue::Text(format!("person {id}"))),
            ])
        })
        .collect()
}

pub async fn query_report(
    store: &MemoryDocumentStore,
    report: &JobReport,
    query_id: &str,
) -> QueryReport {
    let uri = format!(
        "/rowbot/{}/{query_id}/rowbot-query-report.json",
        report.timestamp
    );
    let document = store
        .json(&uri)
        .await
        .unwrap_or_else(|| panic!("missing query report {uri}"));

    serde_json::from_value(document).unwrap()
}

pub async fn insert_batch_reports(
    store: &MemoryDocumentStore,
    query_id: &str,
) -> Vec<InsertBatchReport> {
    let marker = format!("/{query_id}/");
    let uris = store
        .uris_matching(|uri| uri.contains(&marker) && uri.ends_with("/rowbot-insert-report.json"))
        .await;

    let mut reports = Vec::with_capacity(uris.len());
    for uri in uris {
        let document = store.json(&uri).await.unwrap();
        reports.push(serde_json::from_value(document).unwrap());
    }

    reports
}

/// URIs of the row documents of `query_id`, in sequence order.
pub async fn row_document_uris(store: &MemoryDocumentStore, query_id: &str) -> Vec<String> {
    let marker = format!("/{query_id}/");
    let mut uris = store
        .uris_matching(|uri| {
            uri.contains(&marker) && uri.ends_with(".json") && !uri.contains("/rowbot-")
        })
        .await;

    uris.sort_by_key(|uri| sequence_of(uri));
    uris
}

fn sequence_of(uri: &str) -> u64 {
    uri.rsplit('/')
        .next()
        .and_then(|file| file.strip_suffix(".json"))
        .and_then(|sequence| sequence.parse().ok())
        .unwrap_or(u64::MAX)
}
