use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::destination::base::{Document, DocumentStore};
use crate::error::EtlResult;

/// A document held by a [`MemoryDocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub document: Document,
    pub collections: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<String, StoredDocument>,
    writes: u64,
}

/// In-memory document store for tests and dry runs.
///
/// Every write replaces the document stored at its URI, like the real store does. Documents are
/// lost when the store is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored document, keyed by URI.
    pub async fn documents(&self) -> BTreeMap<String, StoredDocument> {
        self.inner.lock().await.documents.clone()
    }

    pub async fn document(&self, uri: &str) -> Option<StoredDocument> {
        self.inner.lock().await.documents.get(uri).cloned()
    }

    /// Parses the JSON document stored at `uri`.
    ///
    /// Returns [`None`] when nothing is stored there or the document is binary.
    pub async fn json(&self, uri: &str) -> Option<serde_json::Value> {
        let inner = self.inner.lock().await;
        let json = inner.documents.get(uri)?.document.as_json()?;

        serde_json::from_str(json).ok()
    }

    /// Returns the URIs of the stored documents matching `predicate`, in URI order.
    pub async fn uris_matching(&self, predicate: impl Fn(&str) -> bool) -> Vec<String> {
        self.inner
            .lock()
            .await
            .documents
            .keys()
            .filter(|uri| predicate(uri))
            .cloned()
            .collect()
    }

    /// Returns the number of writes received, overwrites included.
    pub async fn write_count(&self) -> u64 {
        self.inner.lock().await.writes
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.documents.clear();
        inner.writes = 0;
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn name() -> &'static str {
        "memory"
    }

    async fn write(&self, uri: &str, document: &Document, collections: &[String]) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        debug!(
            uri,
            content_type = document.content_type(),
            bytes = document.len(),
            "storing document in memory"
        );

        inner.writes += 1;
        inner.documents.insert(
            uri.to_string(),
            StoredDocument {
                document: document.clone(),
                collections: collections.to_vec(),
            },
        );

        Ok(())
    }
}
