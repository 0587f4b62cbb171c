//! Shared configuration types for rowbot jobs and the runner.

mod base;
mod job;
mod retry;
mod runner;
mod store;

pub use base::ValidationError;
pub use job::{ConnectionConfig, JobConfig, JobConfigError, QueryConfig, load_job_config};
pub use retry::WriteRetryConfig;
pub use runner::RunnerConfig;
pub use store::StoreConfig;
