use chrono::Utc;
use metrics::gauge;
use rowbot_config::shared::{ConnectionConfig, JobConfig};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::concurrency::pool::WorkerPool;
use crate::destination::base::DocumentStore;
use crate::destination::retry::{RetryPolicy, RetryingWriter};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::metrics::{POOL_LABEL, ROWBOT_POOL_ACTIVE_TASKS, ROWBOT_POOL_QUEUED_TASKS};
use crate::reports::accumulator::ReportAccumulator;
use crate::reports::types::{JobReport, JobStatus};
use crate::reports::writer::ReportWriter;
use crate::source::base::SourceConnector;
use crate::source::registry::ConnectionRegistry;
use crate::types::{QuerySpec, UriLayout, format_job_timestamp};
use crate::workers::insert::{InsertTask, InsertWorker};
use crate::workers::query::{QueryTask, QueryWorker};
use crate::{bail, etl_error};

/// Lifecycle of a [`Job`].
///
/// A job moves forward through `Started`, `Running`, `DrainingQueries`, `DrainingInserts` and
/// `Complete`. `Error` is only reachable from `Started`, when the job cannot be set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Started,
    Running,
    DrainingQueries,
    DrainingInserts,
    Complete,
    Error,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Started => "started",
            JobState::Running => "running",
            JobState::DrainingQueries => "draining_queries",
            JobState::DrainingInserts => "draining_inserts",
            JobState::Complete => "complete",
            JobState::Error => "error",
        };

        f.write_str(name)
    }
}

/// One execution of a job document.
///
/// The job owns every piece of shared state of a run (the report URI lists, the insert result
/// buffers and the source connections) and hands it to the workers explicitly.
pub struct Job<S, D> {
    config: Arc<JobConfig>,
    connector: Arc<S>,
    store: Arc<D>,
}

impl<S, D> Job<S, D>
where
    S: SourceConnector,
    D: DocumentStore + Send + Sync + 'static,
{
    pub fn new(config: JobConfig, connector: S, store: D) -> Self {
        Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            store: Arc::new(store),
        }
    }

    /// Runs the job to completion and returns the final job report.
    ///
    /// Failures of single rows and queries end up in report documents and never make this
    /// return an error. An error is returned when the job could not start (invalid
    /// configuration or unreachable document store) or when the final job report could not be
    /// written.
    pub async fn run(self) -> EtlResult<JobReport> {
        let started_at = Instant::now();
        let timestamp = format_job_timestamp(Utc::now());
        let layout = UriLayout::new(&self.config.uri_prefix, timestamp.clone());
        let writer = RetryingWriter::new(
            self.store.clone(),
            RetryPolicy::from(&self.config.write_retry),
        );
        let reports = Arc::new(ReportWriter::new(writer, layout));

        info!(
            job_name = self.config.job_name.as_deref().unwrap_or_default(),
            %timestamp,
            source = S::name(),
            store = D::name(),
            queries = self.config.queries.len(),
            "starting job"
        );

        // The started report doubles as a check that the store is reachable. If it cannot be
        // written, no other document could be either.
        self.write_job_report(&reports, JobStatus::Started, started_at, None)
            .await?;

        if let Err(err) = self.validate() {
            log_transition(JobState::Started, JobState::Error);
            error!(error = %err, "job configuration is invalid");

            let message = Some(err.summary());
            if let Err(report_err) = self
                .write_job_report(&reports, JobStatus::Error, started_at, message)
                .await
            {
                return Err(vec![err, report_err].into());
            }

            return Err(err);
        }

        let registry = Arc::new(ConnectionRegistry::new());
        let accumulator = Arc::new(ReportAccumulator::new(
            reports.clone(),
            self.config.insert_report_batch_size,
        ));

        let run_result = self
            .run_pools(reports.clone(), accumulator.clone(), registry.clone())
            .await;

        // Whatever happened to the pools, the buffered insert results are flushed and every
        // connection is closed before the final report is written.
        accumulator.flush_all().await;
        registry.close_all().await;

        let (status, message) = match &run_result {
            Ok(()) => (JobStatus::Complete, None),
            Err(err) => (JobStatus::Error, Some(err.summary())),
        };

        let report = match self
            .write_job_report(&reports, status, started_at, message)
            .await
        {
            Ok(report) => report,
            Err(report_err) => {
                return match run_result {
                    Ok(()) => Err(report_err),
                    Err(err) => Err(vec![err, report_err].into()),
                };
            }
        };

        info!(
            status = ?report.status,
            total_runtime = report.total_runtime,
            query_reports = report.query_report_uris.len(),
            insert_reports = report.insert_report_uris.len(),
            "job finished"
        );

        Ok(report)
    }

    fn validate(&self) -> EtlResult<()> {
        self.config.validate()?;

        for connection in &self.config.connections {
            self.connector.validate(connection)?;
        }

        Ok(())
    }

    async fn run_pools(
        &self,
        reports: Arc<ReportWriter<D>>,
        accumulator: Arc<ReportAccumulator<D>>,
        registry: Arc<ConnectionRegistry<S::Connection>>,
    ) -> EtlResult<()> {
        let timestamp = reports.layout().timestamp().to_string();
        let queries: Vec<Arc<QuerySpec>> = self
            .config
            .queries
            .iter()
            .map(|query| Arc::new(QuerySpec::from_config(query, &timestamp)))
            .collect();
        let connections: HashMap<String, ConnectionConfig> = self
            .config
            .connections
            .iter()
            .map(|connection| (connection.key.clone(), connection.clone()))
            .collect();

        // The insert pool has to exist before the query pool, since query workers submit to it.
        let insert_pool = Arc::new(WorkerPool::start(
            "insert",
            self.config.insert_threads,
            self.config.insert_queue_size,
            Arc::new(InsertWorker::new(reports.clone(), accumulator)),
        ));
        let query_pool = Arc::new(WorkerPool::start(
            "query",
            self.config.query_threads,
            self.config.query_queue_size,
            Arc::new(QueryWorker::new(
                self.connector.clone(),
                Arc::new(connections),
                registry,
                insert_pool.clone(),
                reports,
            )),
        ));

        log_transition(JobState::Started, JobState::Running);
        let submitter = spawn_submitter(query_pool.clone(), queries);

        self.drain(submitter, &query_pool, &insert_pool).await
    }

    /// Polls both pools and shuts them down in order.
    ///
    /// The query pool is shut down once every query was submitted, and the insert pool only
    /// after the query pool terminated, since a running query can still submit rows.
    async fn drain<Q, I>(
        &self,
        mut submitter: JoinHandle<EtlResult<()>>,
        query_pool: &WorkerPool<Q>,
        insert_pool: &WorkerPool<I>,
    ) -> EtlResult<()>
    where
        Q: Send + 'static,
        I: Send + 'static,
    {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let status_every = (self.config.status_log_interval_ms / poll_interval.as_millis() as u64)
            .max(1);

        let mut poll = tokio::time::interval(poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = JobState::Running;
        let mut submit_result = Ok(());
        let mut ticks: u64 = 0;

        loop {
            poll.tick().await;
            ticks += 1;

            record_pool_status(query_pool);
            record_pool_status(insert_pool);

            if ticks % status_every == 0 {
                let queries = query_pool.status();
                let inserts = insert_pool.status();
                info!(
                    %state,
                    running_queries = queries.active,
                    queued_queries = queries.queued,
                    running_inserts = inserts.active,
                    queued_inserts = inserts.queued,
                    "job status"
                );
            }

            match state {
                JobState::Running if submitter.is_finished() => {
                    submit_result = match (&mut submitter).await {
                        Ok(result) => result,
                        Err(err) => Err(etl_error!(
                            ErrorKind::WorkerPanic,
                            "Query submitter failed",
                            err.to_string()
                        )),
                    };

                    query_pool.shutdown().await;
                    state = transition(state, JobState::DrainingQueries);
                }
                JobState::DrainingQueries if query_pool.is_terminated() => {
                    insert_pool.shutdown().await;
                    state = transition(state, JobState::DrainingInserts);
                }
                JobState::DrainingInserts if insert_pool.is_terminated() => {
                    transition(state, JobState::Complete);
                    break;
                }
                _ => {}
            }
        }

        submit_result
    }

    async fn write_job_report(
        &self,
        reports: &ReportWriter<D>,
        status: JobStatus,
        started_at: Instant,
        message: Option<String>,
    ) -> EtlResult<JobReport> {
        let report = JobReport {
            job_name: self.config.job_name.clone(),
            job_type: self.config.job_type.clone(),
            timestamp: reports.layout().timestamp().to_string(),
            status,
            total_runtime: started_at.elapsed().as_secs_f64(),
            query_report_uris: reports.query_report_uris().await,
            insert_report_uris: reports.insert_report_uris().await,
            message,
        };

        let result = reports.write_job_report(&report).await;
        if !result.success {
            bail!(
                ErrorKind::DestinationWriteFailed,
                "Job report could not be written",
                result.message.unwrap_or(result.uri)
            );
        }

        Ok(report)
    }
}

fn spawn_submitter(
    query_pool: Arc<WorkerPool<QueryTask>>,
    queries: Vec<Arc<QuerySpec>>,
) -> JoinHandle<EtlResult<()>> {
    tokio::spawn(async move {
        let total = queries.len();
        for query in queries {
            query_pool.submit(QueryTask { query }).await?;
        }

        info!(queries = total, "all queries submitted");

        Ok::<_, EtlError>(())
    })
}

fn record_pool_status<T: Send + 'static>(pool: &WorkerPool<T>) {
    let status = pool.status();
    gauge!(ROWBOT_POOL_ACTIVE_TASKS, POOL_LABEL => pool.name()).set(status.active as f64);
    gauge!(ROWBOT_POOL_QUEUED_TASKS, POOL_LABEL => pool.name()).set(status.queued as f64);
}

fn transition(from: JobState, to: JobState) -> JobState {
    log_transition(from, to);
    to
}

fn log_transition(from: JobState, to: JobState) {
    match to {
        JobState::Error => warn!(%from, %to, "job state changed"),
        _ => info!(%from, %to, "job state changed"),
    }
}
