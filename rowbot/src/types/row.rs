use bytes::Bytes;

/// Value of a single column of a source row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// Any non-binary value in its text representation.
    Text(String),
    /// Opaque binary value, written as a standalone document.
    Binary(Bytes),
    Null,
}

/// One result tuple of a query, with columns in cursor order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRow {
    columns: Vec<(String, CellValue)>,
}

impl SourceRow {
    pub fn new(columns: Vec<(String, CellValue)>) -> Self {
        Self { columns }
    }

    pub fn push(&mut self, name: impl Into<String>, value: CellValue) {
        self.columns.push((name.into(), value));
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the value of the first column called `name`.
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn into_columns(self) -> Vec<(String, CellValue)> {
        self.columns
    }
}

impl<S: Into<String>> FromIterator<(S, CellValue)> for SourceRow {
    fn from_iter<I: IntoIterator<Item = (S, CellValue)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}
