//! Report documents and the components that write them.

pub mod accumulator;
pub mod types;
pub mod writer;
