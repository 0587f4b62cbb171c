use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::source::base::SourceConnection;

/// Live source connections of a job, grouped by connection key.
///
/// Every query opens its own connection, so queries sharing a key run side by side instead of
/// queueing on one session. Workers only register connections. The job closes all of them with
/// [`ConnectionRegistry::close_all`] once both pools have drained.
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    connections: Mutex<HashMap<String, Vec<Arc<C>>>>,
}

impl<C> ConnectionRegistry<C>
where
    C: SourceConnection,
{
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Records an open connection under `key` and returns a shared handle to it.
    ///
    /// Keys are reused by every query of the same connection, so a key can hold any number of
    /// connections.
    pub async fn register(&self, key: &str, connection: C) -> Arc<C> {
        let connection = Arc::new(connection);

        let mut connections = self.connections.lock().await;
        let entries = connections.entry(key.to_string()).or_default();
        entries.push(connection.clone());
        debug!(key, open = entries.len(), "registered source connection");

        connection
    }

    /// Number of registered connections over all keys.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Closes every registered connection and returns how many were closed.
    ///
    /// Close failures are logged and skipped. A connection still referenced elsewhere cannot be
    /// closed and is dropped instead.
    pub async fn close_all(&self) -> usize {
        let connections = mem::take(&mut *self.connections.lock().await);

        let mut closed = 0;
        for (key, entries) in connections {
            for connection in entries {
                let Some(connection) = Arc::into_inner(connection) else {
                    warn!(key = %key, "source connection is still in use, dropping it unclosed");
                    continue;
                };

                match connection.close().await {
                    Ok(()) => closed += 1,
                    Err(err) => {
                        warn!(key = %key, error = %err, "failed to close source connection")
                    }
                }
            }
        }

        info!(closed, "source connections closed");

        closed
    }
}

impl<C> Default for ConnectionRegistry<C>
where
    C: SourceConnection,
{
    fn default() -> Self {
        Self::new()
    }
}
