use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::destination::base::{Document, DocumentStore};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

type UriPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct FailureRule {
    matches: UriPredicate,
    /// Number of attempts per URI that fail, [`None`] for every attempt.
    failures: Option<u32>,
}

#[derive(Default)]
struct Inner {
    rules: Vec<FailureRule>,
    attempts: HashMap<String, u32>,
}

/// Wraps a [`DocumentStore`] and fails writes of selected URIs.
///
/// Attempts are counted per URI, so a rule failing the first `n` attempts lets the `n + 1`th
/// attempt of every matching URI through to the wrapped store.
#[derive(Clone)]
pub struct FailingDocumentStore<D> {
    wrapped: D,
    inner: Arc<Mutex<Inner>>,
}

impl<D> FailingDocumentStore<D> {
    pub fn wrap(store: D) -> Self {
        Self {
            wrapped: store,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Fails every write of a URI matching `matches`.
    pub fn fail_always(&self, matches: impl Fn(&str) -> bool + Send + Sync + 'static) {
        self.add_rule(Box::new(matches), None);
    }

    /// Fails the first `failures` writes of each URI matching `matches`.
    pub fn fail_first(
        &self,
        failures: u32,
        matches: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) {
        self.add_rule(Box::new(matches), Some(failures));
    }

    /// Returns how many writes of `uri` were attempted, failed ones included.
    pub fn attempts(&self, uri: &str) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.attempts.get(uri).copied().unwrap_or(0)
    }

    pub fn inner(&self) -> &D {
        &self.wrapped
    }

    fn add_rule(&self, matches: UriPredicate, failures: Option<u32>) {
        let mut inner = self.inner.lock().unwrap();
        inner.rules.push(FailureRule { matches, failures });
    }

    fn should_fail(&self, uri: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();

        let attempt = inner.attempts.entry(uri.to_string()).or_insert(0);
        *attempt += 1;
        let attempt = *attempt;

        inner.rules.iter().any(|rule| {
            (rule.matches)(uri) && rule.failures.is_none_or(|failures| attempt <= failures)
        })
    }
}

impl<D: fmt::Debug> fmt::Debug for FailingDocumentStore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailingDocumentStore")
            .field("wrapped", &self.wrapped)
            .finish()
    }
}

impl<D> DocumentStore for FailingDocumentStore<D>
where
    D: DocumentStore + Send + Sync,
{
    fn name() -> &'static str {
        "failing"
    }

    async fn write(&self, uri: &str, document: &Document, collections: &[String]) -> EtlResult<()> {
        if self.should_fail(uri) {
            return Err(etl_error!(
                ErrorKind::DestinationWriteFailed,
                "Injected write failure",
                uri
            ));
        }

        self.wrapped.write(uri, document, collections).await
    }
}
