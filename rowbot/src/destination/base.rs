use bytes::Bytes;
use std::future::Future;

use crate::error::EtlResult;

/// Content type of JSON documents.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of binary documents.
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// A document to be written to a [`DocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    /// Serialized JSON, used for row documents and reports.
    Json(String),
    /// Raw bytes of a binary column.
    Binary(Bytes),
}

impl Document {
    pub fn content_type(&self) -> &'static str {
        match self {
            Document::Json(_) => JSON_CONTENT_TYPE,
            Document::Binary(_) => BINARY_CONTENT_TYPE,
        }
    }

    /// Returns the body of the document. Cloning is cheap for binary documents.
    pub fn body(&self) -> Bytes {
        match self {
            Document::Json(json) => Bytes::from(json.clone()),
            Document::Binary(bytes) => bytes.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Document::Json(json) => json.len(),
            Document::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the JSON text, or [`None`] for binary documents.
    pub fn as_json(&self) -> Option<&str> {
        match self {
            Document::Json(json) => Some(json),
            Document::Binary(_) => None,
        }
    }
}

/// Trait for content stores that accept documents addressed by URI.
///
/// A write either stores the whole document at `uri`, replacing any previous version, or fails.
/// Writes of the same URI are retried by [`crate::destination::retry::RetryingWriter`], so
/// implementations must treat a repeated write as an overwrite. Implementations are shared by
/// every worker of a job and must support concurrent writes.
pub trait DocumentStore {
    /// Returns the name of the store, used in logs.
    fn name() -> &'static str;

    /// Writes `document` at `uri`, tagged with `collections`.
    fn write(
        &self,
        uri: &str,
        document: &Document,
        collections: &[String],
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
