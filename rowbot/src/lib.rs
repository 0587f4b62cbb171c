//! Parallel extraction of SQL query results into a document store.
//!
//! A [`job::Job`] runs every configured query on a pool of query workers. Each worker streams
//! its rows one at a time into a bounded pool of insert workers, which turn every row into a
//! JSON document (plus one binary document per binary column) and write them through a
//! [`destination::retry::RetryingWriter`]. Write outcomes are buffered per query and flushed as
//! insert batch reports, and the job finishes by writing a report that links all of them.
//!
//! The source database and the document store sit behind the [`source::base::SourceConnector`]
//! and [`destination::base::DocumentStore`] traits, with Postgres and REST implementations
//! plus in-memory ones for tests and dry runs.

pub mod concurrency;
pub mod conversions;
pub mod destination;
pub mod error;
pub mod job;
mod macros;
pub mod metrics;
pub mod reports;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
