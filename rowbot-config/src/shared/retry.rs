use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Retry settings applied to every document store write.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteRetryConfig {
    /// Total number of attempts for a single write, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay, in milliseconds, between two attempts.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl WriteRetryConfig {
    /// Default number of attempts per write.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Default delay between attempts.
    pub const DEFAULT_BACKOFF_MS: u64 = 1000;

    /// Ensures at least one attempt is made.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::invalid_field(
                "writeRetry.maxAttempts",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for WriteRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    WriteRetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    WriteRetryConfig::DEFAULT_BACKOFF_MS
}
