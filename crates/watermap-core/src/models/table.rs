//! Plain tabular data read from delimited text files.

use crate::error::{Result, WatermapError};

/// Header plus string-valued rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Where the table was read from, used in error messages
    pub source_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(source_name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            source_name: source_name.into(),
            columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column. Names are matched exactly, including whitespace.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| WatermapError::MissingColumn {
                column: name.to_string(),
                source_name: self.source_name.clone(),
            })
    }

    /// Cell value, None for short rows and empty cells
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}
