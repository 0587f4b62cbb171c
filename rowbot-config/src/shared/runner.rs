use serde::Deserialize;

use crate::shared::{StoreConfig, ValidationError};

/// Service configuration of the runner binary.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Where documents and reports are written.
    pub store: StoreConfig,
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.store.validate()
    }
}
