//! Relational sources that queries are streamed from.

pub mod base;
pub mod copy;
pub mod memory;
pub mod postgres;
pub mod registry;

pub use base::{RowStream, SourceConnection, SourceConnector};
