use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Connection settings for the document store.
///
/// This intentionally does not implement [`serde::Serialize`] so the password cannot leak into
/// serialized output. [`SecretString`] keeps it out of `Debug` output as well.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Base URL of the store's REST endpoint, e.g. `http://localhost:8000`.
    pub url: String,
    /// User the runner authenticates as.
    pub username: String,
    /// Password for [`StoreConfig::username`].
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Target database, when it differs from the endpoint's default one.
    #[serde(default)]
    pub database: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl StoreConfig {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::invalid_field(
                "store.url",
                "must not be empty",
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ValidationError::invalid_field(
                "store.timeout_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    StoreConfig::DEFAULT_TIMEOUT_MS
}
