//! Error types and result definitions for rowbot operations.
//!
//! A single [`EtlError`] type carries an [`ErrorKind`] classification, a static description,
//! optional dynamic detail and source, plus the callsite and backtrace where it was created.
//! Several errors can be aggregated into one, which is how the job reports failures that happen
//! while it is already unwinding.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use rowbot_config::shared::{JobConfigError, ValidationError};

use crate::source::copy::CopyRowError;

/// Result type used by every fallible rowbot operation.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of rowbot.
///
/// Errors that stay local to a row or a query never leave the worker that produced them: they
/// are rendered with [`EtlError::summary`] into the `message` of a report document. Only
/// configuration failures and a failed final job report surface to the caller.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Categories of failures, grouped by the part of the pipeline they come from.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    SourceConnectionFailed,
    DestinationConnectionFailed,

    // Query & Write Errors
    SourceQueryFailed,
    SourceOperationCanceled,
    SourceSchemaError,
    DestinationWriteFailed,

    // Data & Transformation Errors
    ConversionError,
    InvalidData,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SourceIoError,
    SerializationError,
    DeserializationError,

    // Security & Authentication Errors
    AuthenticationError,
    PermissionDenied,

    // State & Workflow Errors
    InvalidState,
    WorkerPoolShutdown,
    WorkerPanic,
    SourceDatabaseShutdown,

    Unknown,
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors report the kind of their first error, or [`ErrorKind::Unknown`] when
    /// empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { .. } => "Multiple errors occurred",
        }
    }

    /// Returns the dynamic detail of this error, if any.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns a one line rendering of the error without location or backtrace.
    ///
    /// This is the text stored in the `message` field of report documents.
    pub fn summary(&self) -> String {
        match self.repr {
            ErrorRepr::Single(ref payload) => match payload.detail.as_deref() {
                Some(detail) if !detail.trim().is_empty() => {
                    format!("{}: {}", payload.description, detail.trim())
                }
                _ => payload.description.to_string(),
            },
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .map(|err| err.summary())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error, exposed through [`error::Error::source`].
    ///
    /// Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} error(s) aggregated @ {}:{}:{}",
                    errors.len(),
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, label: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {label}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n  ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates several errors. A single error is returned as is.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();
        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        EtlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Data => {
                (ErrorKind::SerializationError, "JSON serialization failed")
            }
            serde_json::error::Category::Syntax | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError::from_source(kind, description, err)
    }
}

impl From<std::num::ParseIntError> for EtlError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> EtlError {
        EtlError::from_source(ErrorKind::ConversionError, "Integer parsing failed", err)
    }
}

impl From<uuid::Error> for EtlError {
    #[track_caller]
    fn from(err: uuid::Error) -> EtlError {
        EtlError::from_source(ErrorKind::InvalidData, "UUID parsing failed", err)
    }
}

impl From<CopyRowError> for EtlError {
    #[track_caller]
    fn from(err: CopyRowError) -> EtlError {
        EtlError::from_source(ErrorKind::ConversionError, "Invalid COPY row", err)
    }
}

impl From<ValidationError> for EtlError {
    #[track_caller]
    fn from(err: ValidationError) -> EtlError {
        EtlError::from_source(ErrorKind::ConfigError, "Invalid job configuration", err)
    }
}

impl From<JobConfigError> for EtlError {
    #[track_caller]
    fn from(err: JobConfigError) -> EtlError {
        EtlError::from_source(ErrorKind::ConfigError, "Job document could not be loaded", err)
    }
}

/// Maps [`reqwest::Error`] to destination kinds.
///
/// Failures to reach the store are connection failures, everything else is a failed write.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::DestinationConnectionFailed,
                "Document store is unreachable",
            )
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "Document store request is invalid")
        } else {
            (ErrorKind::DestinationWriteFailed, "Document store request failed")
        };

        EtlError::from_source(kind, description, err)
    }
}

/// Maps [`tokio_postgres::Error`] to source kinds based on the SQLSTATE class.
///
/// Errors without a SQLSTATE come from the client side of the connection and are treated as
/// connection failures.
impl From<tokio_postgres::Error> for EtlError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> EtlError {
        use tokio_postgres::error::SqlState;

        let (kind, description) = match err.code() {
            None => (
                ErrorKind::SourceConnectionFailed,
                "PostgreSQL connection failed",
            ),
            Some(code) if *code == SqlState::INSUFFICIENT_PRIVILEGE => {
                (ErrorKind::PermissionDenied, "PostgreSQL permission denied")
            }
            Some(code) if *code == SqlState::QUERY_CANCELED => (
                ErrorKind::SourceOperationCanceled,
                "PostgreSQL query canceled",
            ),
            Some(code)
                if *code == SqlState::ADMIN_SHUTDOWN || *code == SqlState::CRASH_SHUTDOWN =>
            {
                (
                    ErrorKind::SourceDatabaseShutdown,
                    "PostgreSQL database shut down",
                )
            }
            Some(code) => match &code.code()[..2] {
                "08" | "53" => (
                    ErrorKind::SourceConnectionFailed,
                    "PostgreSQL connection failed",
                ),
                "28" => (
                    ErrorKind::AuthenticationError,
                    "PostgreSQL authentication failed",
                ),
                "22" => (
                    ErrorKind::ConversionError,
                    "PostgreSQL data conversion failed",
                ),
                "3D" | "3F" | "0A" => (
                    ErrorKind::SourceSchemaError,
                    "PostgreSQL schema object not found",
                ),
                "58" | "XX" => (ErrorKind::SourceIoError, "PostgreSQL system error"),
                _ => (ErrorKind::SourceQueryFailed, "PostgreSQL query failed"),
            },
        };

        EtlError::from_source(kind, description, err)
    }
}
