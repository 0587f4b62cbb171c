//! Document stores that receive row, binary and report documents.

pub mod base;
pub mod memory;
pub mod rest;
pub mod retry;

pub use base::{Document, DocumentStore};
