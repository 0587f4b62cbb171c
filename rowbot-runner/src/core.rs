use rowbot::destination::base::DocumentStore;
use rowbot::destination::memory::MemoryDocumentStore;
use rowbot::destination::rest::RestDocumentStore;
use rowbot::job::Job;
use rowbot::reports::types::JobReport;
use rowbot::source::postgres::PostgresConnector;
use rowbot_config::load_config;
use rowbot_config::shared::{JobConfig, RunnerConfig};
use tracing::{info, warn};

/// Runs `job_config` to completion.
///
/// A dry run keeps every document in memory and prints the final job report with document
/// counts instead of writing to the store, so the service configuration is not needed.
pub async fn run_job(job_config: JobConfig, dry_run: bool) -> anyhow::Result<JobReport> {
    if dry_run {
        info!("dry run, documents are kept in memory");

        let store = MemoryDocumentStore::new();
        let report = run_with_store(job_config, store.clone()).await?;
        print_summary(&store, &report).await?;

        return Ok(report);
    }

    let runner_config: RunnerConfig = load_config()?;
    runner_config.validate()?;
    info!(
        url = %runner_config.store.url,
        username = %runner_config.store.username,
        database = runner_config.store.database.as_deref().unwrap_or("default"),
        "loaded store configuration"
    );

    let store = RestDocumentStore::new(&runner_config.store)?;

    run_with_store(job_config, store).await
}

async fn run_with_store<D>(job_config: JobConfig, store: D) -> anyhow::Result<JobReport>
where
    D: DocumentStore + Send + Sync + 'static,
{
    // There is no mid-flight cancellation: an interrupted job still drains and writes its
    // final report.
    let ctrl_c = tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received ctrl+c, the job keeps running until every query is drained");
        }
    });

    let result = Job::new(job_config, PostgresConnector::new(), store)
        .run()
        .await;
    ctrl_c.abort();

    Ok(result?)
}

async fn print_summary(store: &MemoryDocumentStore, report: &JobReport) -> anyhow::Result<()> {
    let documents = store.documents().await;
    let binary = documents
        .keys()
        .filter(|uri| uri.contains("/binary/"))
        .count();

    println!("{}", serde_json::to_string_pretty(report)?);
    println!(
        "{} documents written ({binary} binary), {} query reports, {} insert batch reports",
        documents.len(),
        report.query_report_uris.len(),
        report.insert_report_uris.len()
    );

    Ok(())
}
