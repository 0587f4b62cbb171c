//! Configuration for rowbot jobs and the runner service.
//!
//! Two kinds of configuration live here: the job document, which describes which queries to run
//! and where their rows go, and the service configuration, which describes how to reach the
//! document store and is loaded from layered files plus environment overrides.

pub mod environment;
mod load;
pub mod shared;

pub use load::{LoadConfigError, load_config, load_config_from};
