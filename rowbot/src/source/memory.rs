use futures::StreamExt;
use futures::stream;
use rowbot_config::shared::ConnectionConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::base::{RowStream, SourceConnection, SourceConnector};
use crate::types::SourceRow;

/// Scripted result of one query of a [`MemoryDatabase`].
#[derive(Debug, Clone, Default)]
pub struct MemoryResult {
    rows: Vec<SourceRow>,
    fail_after: Option<(usize, String)>,
    row_delay: Option<Duration>,
}

impl MemoryResult {
    pub fn rows(rows: Vec<SourceRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Streams the first `rows` rows and then fails with `message`.
    pub fn fail_after(mut self, rows: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((rows, message.into()));
        self
    }

    /// Waits `delay` before producing each row.
    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = Some(delay);
        self
    }

    fn items(&self) -> Vec<EtlResult<SourceRow>> {
        match &self.fail_after {
            Some((rows, message)) => {
                let mut items: Vec<_> = self.rows.iter().take(*rows).cloned().map(Ok).collect();
                items.push(Err(etl_error!(
                    ErrorKind::SourceQueryFailed,
                    "Query failed while streaming",
                    message.clone()
                )));
                items
            }
            None => self.rows.iter().cloned().map(Ok).collect(),
        }
    }
}

/// Scripted database reachable through one connection string.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    connect_error: Option<String>,
    results: HashMap<String, MemoryResult>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// A database whose connections always fail with `message`.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            connect_error: Some(message.into()),
            results: HashMap::new(),
        }
    }

    /// Scripts the result of `sql`. Queries are matched on their trimmed text.
    pub fn with_result(mut self, sql: &str, result: MemoryResult) -> Self {
        self.results.insert(sql.trim().to_string(), result);
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// In-memory source keyed by connection string, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    databases: Arc<HashMap<String, MemoryDatabase>>,
    counters: Arc<Counters>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a database reachable through `connection_string`.
    ///
    /// Must be called before the connector is cloned.
    pub fn with_database(mut self, connection_string: &str, database: MemoryDatabase) -> Self {
        Arc::make_mut(&mut self.databases).insert(connection_string.to_string(), database);
        self
    }

    /// Number of connections opened so far.
    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Number of connections closed so far.
    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

impl SourceConnector for MemoryConnector {
    type Connection = MemoryConnection;

    fn name() -> &'static str {
        "memory"
    }

    fn validate(&self, config: &ConnectionConfig) -> EtlResult<()> {
        if config.connection_string.trim().is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "Empty connection string",
                format!("connection `{}`", config.key)
            );
        }

        Ok(())
    }

    async fn connect(&self, config: &ConnectionConfig) -> EtlResult<MemoryConnection> {
        let Some(database) = self.databases.get(&config.connection_string) else {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Unknown in-memory database",
                config.connection_string.clone()
            );
        };

        if let Some(message) = &database.connect_error {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Could not connect to in-memory database",
                message.clone()
            );
        }

        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryConnection {
            database: database.clone(),
            counters: self.counters.clone(),
        })
    }
}

/// Connection to a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryConnection {
    database: MemoryDatabase,
    counters: Arc<Counters>,
}

impl SourceConnection for MemoryConnection {
    async fn query<'a>(&'a self, sql: &'a str) -> EtlResult<RowStream<'a>> {
        let Some(result) = self.database.results.get(sql.trim()) else {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Query is not scripted",
                sql.trim().to_string()
            );
        };

        let items = stream::iter(result.items());
        match result.row_delay {
            Some(delay) => Ok(items
                .then(move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                })
                .boxed()),
            None => Ok(items.boxed()),
        }
    }

    async fn close(self) -> EtlResult<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;
    use futures::TryStreamExt;

    fn row(id: u32) -> SourceRow {
        SourceRow::new(vec![("id".to_string(), CellValue::Text(id.to_string()))])
    }

    fn config(connection_string: &str) -> ConnectionConfig {
        ConnectionConfig {
            key: "main".to_string(),
            connection_string: connection_string.to_string(),
            properties: Default::default(),
        }
    }

    #[tokio::test]
    async fn streams_scripted_rows_then_fails() {
        let connector = MemoryConnector::new().with_database(
            "mem://shop",
            MemoryDatabase::new().with_result(
                "select id from orders",
                MemoryResult::rows(vec![row(1), row(2), row(3)]).fail_after(2, "lost connection"),
            ),
        );

        let connection = connector.connect(&config("mem://shop")).await.unwrap();
        let mut stream = connection.query(" select id from orders ").await.unwrap();

        assert_eq!(stream.try_next().await.unwrap(), Some(row(1)));
        assert_eq!(stream.try_next().await.unwrap(), Some(row(2)));
        let err = stream.try_next().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
        assert!(err.summary().contains("lost connection"));
        drop(stream);

        connection.close().await.unwrap();
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn unreachable_and_unknown_databases_fail_to_connect() {
        let connector = MemoryConnector::new()
            .with_database("mem://down", MemoryDatabase::unreachable("connection refused"));

        let err = connector.connect(&config("mem://down")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
        assert!(err.summary().contains("connection refused"));

        let err = connector.connect(&config("mem://nowhere")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn unscripted_query_fails() {
        let connector = MemoryConnector::new().with_database("mem://shop", MemoryDatabase::new());
        let connection = connector.connect(&config("mem://shop")).await.unwrap();

        let err = connection.query("select 1").await.err().unwrap();

        assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
    }
}
