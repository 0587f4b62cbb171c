use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field holds a value outside of its allowed range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// Two connections were declared with the same key.
    #[error("Connection key `{0}` is declared more than once")]
    DuplicateConnectionKey(String),
    /// A query references a connection key that is not declared.
    #[error("Query `{query}` references unknown connection `{key}`")]
    UnknownConnectionKey { query: String, key: String },
    /// Two queries were declared with the same id.
    #[error("Query id `{0}` is declared more than once")]
    DuplicateQueryId(String),
}

impl ValidationError {
    pub(crate) fn invalid_field(field: &str, constraint: &str) -> Self {
        Self::InvalidFieldValue {
            field: field.to_string(),
            constraint: constraint.to_string(),
        }
    }
}
