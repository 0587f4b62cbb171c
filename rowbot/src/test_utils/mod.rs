//! Helpers for testing jobs without a database or a document store.
//!
//! - [`notify`] wraps [`tokio::sync::Notify`] with a timeout so waiting tests fail instead of
//!   hanging.
//! - [`failing_store`] wraps a [`crate::destination::DocumentStore`] and injects write failures
//!   for selected URIs.
//!
//! The scripted source lives in [`crate::source::memory`] since dry runs use it as well.

pub mod failing_store;
pub mod notify;
