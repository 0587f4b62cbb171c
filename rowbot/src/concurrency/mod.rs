//! Concurrency primitives used to run the query and insert stages.

pub mod pool;
