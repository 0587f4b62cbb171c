//! Runs one rowbot job document against Postgres and the document store.
//!
//! Per-row and per-query failures end up in the report documents and do not change the exit
//! code. The process fails only when the job cannot start or its final report cannot be written.

use anyhow::Context;
use clap::Parser;
use rowbot_config::environment::Environment;
use rowbot_config::shared::{JobConfig, load_job_config};
use rowbot_telemetry::metrics::init_metrics;
use rowbot_telemetry::tracing::init_tracing;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

use crate::core::run_job;

mod core;

#[derive(Debug, Parser)]
#[command(
    name = "rowbot-runner",
    version,
    about = "Streams SQL query results into a document store"
)]
struct Args {
    /// Path of the JSON job document.
    job_file: PathBuf,

    /// Serves Prometheus metrics on this address, e.g. `0.0.0.0:9000`.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Writes every document to memory instead of the store and prints a summary.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let environment = Environment::load()?;
    init_tracing(env!("CARGO_BIN_NAME"), environment)?;

    let job_config = load_job_config(&args.job_file)
        .with_context(|| format!("failed to load job document {}", args.job_file.display()))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args, job_config))
}

async fn async_main(args: Args, job_config: JobConfig) -> anyhow::Result<()> {
    if let Some(addr) = args.metrics_addr {
        init_metrics(addr, job_config.job_name.as_deref())
            .context("failed to start the metrics exporter")?;
        info!(%addr, "serving metrics");
    }

    match run_job(job_config, args.dry_run).await {
        Ok(report) => {
            info!(status = ?report.status, "job report written");
            Ok(())
        }
        Err(err) => {
            error!("{err:#}");
            Err(err)
        }
    }
}
