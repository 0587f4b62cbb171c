//! Logging and metrics setup shared by rowbot binaries and tests.

pub mod metrics;
pub mod tracing;
