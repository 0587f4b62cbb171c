use rowbot_config::shared::ConnectionConfig;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{Instrument, debug, error, info, warn};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::base::{RowStream, SourceConnection, SourceConnector};
use crate::source::copy::{CopyColumn, CopyRowStream};

/// Prefix of JDBC style connection strings, stripped before parsing.
const JDBC_PREFIX: &str = "jdbc:";

/// Session options applied unless the connection sets its own `options`.
///
/// They pin the text representation of dates, intervals and floats so row documents look the
/// same whatever the server defaults are.
const DEFAULT_SESSION_OPTIONS: &str =
    "-c datestyle=ISO -c intervalstyle=postgres -c extra_float_digits=3 -c client_encoding=UTF8";

/// Appended to every session's options, since `bytea` columns are only decoded from hex.
const BYTEA_OUTPUT_OPTION: &str = "-c bytea_output=hex";

/// Opens Postgres connections with `tokio-postgres`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }

    /// Builds the driver configuration from a connection string and its properties.
    ///
    /// The connection string may be a `key=value` list or a URL, optionally prefixed with
    /// `jdbc:`. Properties override what the connection string sets.
    pub fn pg_config(config: &ConnectionConfig) -> EtlResult<Config> {
        let connection_string = config
            .connection_string
            .strip_prefix(JDBC_PREFIX)
            .unwrap_or(&config.connection_string);

        let mut pg_config = match Config::from_str(connection_string) {
            Ok(pg_config) => pg_config,
            Err(err) => bail!(
                ErrorKind::ConfigError,
                "Invalid Postgres connection string",
                format!("connection `{}`: {err}", config.key)
            ),
        };

        for (property, value) in &config.properties {
            match property.as_str() {
                "user" => {
                    pg_config.user(value);
                }
                "password" => {
                    pg_config.password(value);
                }
                "dbname" => {
                    pg_config.dbname(value);
                }
                "application_name" => {
                    pg_config.application_name(value);
                }
                "options" => {
                    pg_config.options(value);
                }
                "connect_timeout" => {
                    let Ok(seconds) = value.parse::<u64>() else {
                        bail!(
                            ErrorKind::ConfigError,
                            "Invalid Postgres connect timeout",
                            format!(
                                "connection `{}`: `{value}` is not a number of seconds",
                                config.key
                            )
                        );
                    };
                    pg_config.connect_timeout(Duration::from_secs(seconds));
                }
                _ => {
                    warn!(
                        connection = %config.key,
                        property = property.as_str(),
                        "ignoring unsupported connection property"
                    );
                }
            }
        }

        let options = session_options(pg_config.get_options());
        pg_config.options(&options);

        Ok(pg_config)
    }
}

impl SourceConnector for PostgresConnector {
    type Connection = PostgresConnection;

    fn name() -> &'static str {
        "postgres"
    }

    fn validate(&self, config: &ConnectionConfig) -> EtlResult<()> {
        Self::pg_config(config).map(|_| ())
    }

    async fn connect(&self, config: &ConnectionConfig) -> EtlResult<PostgresConnection> {
        let pg_config = Self::pg_config(config)?;

        let (client, connection) = pg_config.connect(NoTls).await?;

        let span = tracing::Span::current();
        let connection_key = config.key.clone();
        let connection_task = tokio::spawn(
            async move {
                match connection.await {
                    Err(err) => error!(
                        connection = %connection_key,
                        error = %err,
                        "an error occurred during the postgres connection"
                    ),
                    Ok(()) => debug!(
                        connection = %connection_key,
                        "postgres connection terminated successfully"
                    ),
                }
            }
            .instrument(span),
        );

        info!(connection = %config.key, "connected to postgres");

        Ok(PostgresConnection {
            client,
            connection_task,
        })
    }
}

/// A Postgres connection. Queries are streamed with `COPY ... TO STDOUT`.
#[derive(Debug)]
pub struct PostgresConnection {
    client: Client,
    connection_task: JoinHandle<()>,
}

impl SourceConnection for PostgresConnection {
    async fn query<'a>(&'a self, sql: &'a str) -> EtlResult<RowStream<'a>> {
        let sql = normalize_query(sql);

        // Preparing the query gives the result columns without running it.
        let statement = self.client.prepare(sql).await?;
        let columns: Vec<CopyColumn> = statement
            .columns()
            .iter()
            .map(|column| CopyColumn {
                name: column.name().to_string(),
                binary: *column.type_() == Type::BYTEA,
            })
            .collect();

        let copy_query = format!("copy ({sql}) to stdout");
        let stream = self.client.copy_out(copy_query.as_str()).await?;

        debug!(columns = columns.len(), "streaming query results");

        Ok(Box::pin(CopyRowStream::wrap(stream, columns)))
    }

    async fn close(self) -> EtlResult<()> {
        // Dropping the client terminates the connection task.
        drop(self.client);

        if let Err(err) = self.connection_task.await {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Postgres connection task failed",
                err
            );
        }

        Ok(())
    }
}

/// Returns `options` with the hex `bytea` output forced, falling back to the defaults.
///
/// The forced option comes last, so it wins over a `bytea_output` set by the connection.
fn session_options(options: Option<&str>) -> String {
    match options.map(str::trim).filter(|options| !options.is_empty()) {
        Some(options) => format!("{options} {BYTEA_OUTPUT_OPTION}"),
        None => format!("{DEFAULT_SESSION_OPTIONS} {BYTEA_OUTPUT_OPTION}"),
    }
}

/// Strips surrounding whitespace and trailing semicolons, which `COPY (...)` does not accept.
fn normalize_query(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}
