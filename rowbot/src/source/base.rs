use futures::stream::BoxStream;
use rowbot_config::shared::ConnectionConfig;
use std::future::Future;

use crate::error::EtlResult;
use crate::types::SourceRow;

/// Lazily produced rows of a query, in cursor order.
///
/// The stream ends after the last row, or yields an error and should not be polled further.
pub type RowStream<'a> = BoxStream<'a, EtlResult<SourceRow>>;

/// Opens connections to a kind of relational database.
pub trait SourceConnector: Send + Sync + 'static {
    type Connection: SourceConnection;

    /// Returns the name of the source, used in logs.
    fn name() -> &'static str;

    /// Checks that `config` can be used to connect, without connecting.
    ///
    /// Called for every connection before the job starts, so that a malformed connection string
    /// fails the whole job instead of each of its queries.
    fn validate(&self, config: &ConnectionConfig) -> EtlResult<()>;

    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = EtlResult<Self::Connection>> + Send;
}

/// A live connection that can stream query results.
///
/// A connection can be shared by several queries running at the same time.
pub trait SourceConnection: Send + Sync + 'static {
    /// Runs `sql` and returns its rows as a stream.
    ///
    /// Column values of binary types are returned as [`crate::types::CellValue::Binary`],
    /// everything else as text.
    fn query<'a>(&'a self, sql: &'a str)
    -> impl Future<Output = EtlResult<RowStream<'a>>> + Send;

    /// Closes the connection.
    fn close(self) -> impl Future<Output = EtlResult<()>> + Send
    where
        Self: Sized;
}
