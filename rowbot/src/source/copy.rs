use bytes::Bytes;
use core::pin::Pin;
use core::task::{Context, Poll};
use futures::{Stream, ready};
use pin_project_lite::pin_project;
use thiserror::Error;
use tokio_postgres::CopyOutStream;

use crate::conversions::hex::parse_bytea_hex;
use crate::error::EtlResult;
use crate::types::{CellValue, SourceRow};

/// Marker of a null column in the text COPY format.
const NULL_MARKER: &[u8] = b"\\N";

/// Errors raised while decoding a row of the text COPY format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CopyRowError {
    #[error("expected {expected} columns but the row has {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("column `{0}` ends with an unterminated escape sequence")]
    DanglingEscape(String),

    #[error("column `{0}` is not valid UTF-8")]
    InvalidUtf8(String),
}

/// A result column of a COPY query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyColumn {
    pub name: String,
    /// Whether the column holds `bytea` values.
    pub binary: bool,
}

impl CopyColumn {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary: false,
        }
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary: true,
        }
    }
}

/// Decodes one row of `COPY ... TO STDOUT` text output.
///
/// Columns are separated by tabs, `\N` stands for null and backslash escapes are resolved.
/// Binary columns are decoded from their `\x` hex representation.
pub fn parse_copy_row(line: &[u8], columns: &[CopyColumn]) -> EtlResult<SourceRow> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);

    let fields: Vec<&[u8]> = if line.is_empty() && columns.len() <= 1 {
        // A single empty text column and a row without columns look the same.
        if columns.is_empty() { Vec::new() } else { vec![line] }
    } else {
        line.split(|byte| *byte == b'\t').collect()
    };

    if fields.len() != columns.len() {
        return Err(CopyRowError::ColumnCount {
            expected: columns.len(),
            found: fields.len(),
        }
        .into());
    }

    let mut row = SourceRow::default();
    for (column, field) in columns.iter().zip(fields) {
        let value = if field == NULL_MARKER {
            CellValue::Null
        } else {
            let text = String::from_utf8(unescape(field, &column.name)?)
                .map_err(|_| CopyRowError::InvalidUtf8(column.name.clone()))?;

            if column.binary {
                CellValue::Binary(Bytes::from(parse_bytea_hex(&text)?))
            } else {
                CellValue::Text(text)
            }
        };

        row.push(column.name.clone(), value);
    }

    Ok(row)
}

fn unescape(field: &[u8], column: &str) -> Result<Vec<u8>, CopyRowError> {
    let mut unescaped = Vec::with_capacity(field.len());
    let mut bytes = field.iter();

    while let Some(&byte) = bytes.next() {
        if byte != b'\\' {
            unescaped.push(byte);
            continue;
        }

        let Some(&escaped) = bytes.next() else {
            return Err(CopyRowError::DanglingEscape(column.to_string()));
        };

        unescaped.push(match escaped {
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            other => other,
        });
    }

    Ok(unescaped)
}

pin_project! {
    /// Rows of a `COPY (<query>) TO STDOUT` operation, decoded one at a time.
    #[must_use = "streams do nothing unless polled"]
    pub struct CopyRowStream {
        #[pin]
        stream: CopyOutStream,
        columns: Vec<CopyColumn>,
    }
}

impl CopyRowStream {
    pub fn wrap(stream: CopyOutStream, columns: Vec<CopyColumn>) -> Self {
        Self { stream, columns }
    }
}

impl Stream for CopyRowStream {
    type Item = EtlResult<SourceRow>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match ready!(this.stream.poll_next(cx)) {
            // The server sends one data message per row.
            Some(Ok(line)) => Poll::Ready(Some(parse_copy_row(&line, this.columns))),
            Some(Err(err)) => Poll::Ready(Some(Err(err.into()))),
            None => Poll::Ready(None),
        }
    }
}
