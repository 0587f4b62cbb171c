use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory, relative to the working directory, holding the service configuration.
const CONFIGURATION_DIR: &str = "configuration";

/// Extensions tried, in order, for every configuration file.
const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix of environment variable overrides, e.g. `APP_STORE__URL`.
const ENV_PREFIX: &str = "APP";

/// Errors raised while loading the service configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("could not determine the runtime environment: {0}")]
    Environment(#[from] io::Error),

    /// No `base` file exists in the configuration directory.
    #[error("no base configuration in `{directory}`, expected one of {expected}")]
    MissingBaseFile { directory: PathBuf, expected: String },

    /// A file could not be parsed, or the merged values do not fit the target type.
    #[error("invalid configuration in `{directory}`: {source}")]
    Invalid {
        directory: PathBuf,
        source: config::ConfigError,
    },
}

/// Loads the service configuration from `./configuration`.
///
/// See [`load_config_from`] for the layering rules.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    let directory = std::env::current_dir()
        .map_err(LoadConfigError::CurrentDir)?
        .join(CONFIGURATION_DIR);

    load_config_from(&directory, Environment::load()?)
}

/// Loads the service configuration from `directory`.
///
/// `base.*` is required. `{environment}.*` is optional and overrides it, and `APP_` variables
/// override both, with `__` between nested keys (`APP_STORE__PASSWORD`).
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    let invalid = |source| LoadConfigError::Invalid {
        directory: directory.to_path_buf(),
        source,
    };

    let Some(base_file) = find_file(directory, "base") else {
        return Err(LoadConfigError::MissingBaseFile {
            directory: directory.to_path_buf(),
            expected: EXTENSIONS
                .iter()
                .map(|extension| format!("`base.{extension}`"))
                .collect::<Vec<_>>()
                .join(", "),
        });
    };

    let mut builder = config::Config::builder().add_source(config::File::from(base_file));
    if let Some(environment_file) = find_file(directory, environment.as_str()) {
        builder = builder.add_source(config::File::from(environment_file));
    }

    builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .map_err(invalid)?
        .try_deserialize()
        .map_err(invalid)
}

fn find_file(directory: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
}
