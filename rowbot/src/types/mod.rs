//! Core data types shared by the pipeline stages.

mod query;
mod row;
mod uri;

pub use query::QuerySpec;
pub use row::{CellValue, SourceRow};
pub use uri::{UriLayout, format_job_timestamp};
