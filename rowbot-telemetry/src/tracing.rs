use rowbot_config::environment::Environment;
use std::sync::Once;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

static TEST_TRACING: Once = Once::new();

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Installs the global tracing subscriber of a binary.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Logs are human readable in
/// [`Environment::Dev`] and one JSON object per line in [`Environment::Prod`], so that they can
/// be shipped as is.
pub fn init_tracing(app_name: &str, environment: Environment) -> Result<(), TracingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match environment {
        Environment::Dev => registry.with(fmt::layer().pretty()).try_init()?,
        Environment::Prod => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?,
    }

    tracing::info!(app_name, %environment, "tracing initialized");

    Ok(())
}

/// Installs a subscriber writing to the test output, once per test binary.
///
/// Set `ENABLE_TRACING=1` to see the logs of a test run.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_err() {
            return;
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
