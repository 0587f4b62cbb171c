//! Workers of the query and insert stages.

pub mod base;
pub mod insert;
pub mod query;
