//! Normalized tabular data produced by a parser

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One data row: header name → cell value
pub type Row = BTreeMap<String, String>;

/// Where a table came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// Original upload filename
    pub filename: String,

    /// Format tag ("csv", "tsv", "xlsx", ...)
    #[serde(rename = "type")]
    pub source_type: String,

    /// Worksheet name, for formats that have sheets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

/// Headers plus rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularData {
    /// Column headers in file order
    pub headers: Vec<String>,

    /// Data rows (header row excluded)
    pub rows: Vec<Row>,

    /// Always equal to `rows.len()`
    pub row_count: usize,

    /// Always equal to `headers.len()`
    pub column_count: usize,
}

/// Parser bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseMetadata {
    /// When the file was parsed
    pub parsed_at: DateTime<Utc>,

    /// Version of the parser that produced this table
    pub parser_version: String,
}

/// Parser output consumed by the extraction pipeline
///
/// Invariants: `data.rows.len() == data.row_count`, and every row's key set
/// is a subset of `data.headers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedData {
    /// Source file description
    pub source: DataSource,

    /// The table itself
    pub data: TabularData,

    /// Parser bookkeeping
    pub metadata: ParseMetadata,
}

impl NormalizedData {
    /// Build a table from headers and rows, deriving the counts
    pub fn new(
        source: DataSource,
        headers: Vec<String>,
        rows: Vec<Row>,
        parser_version: impl Into<String>,
    ) -> Self {
        let row_count = rows.len();
        let column_count = headers.len();
        Self {
            source,
            data: TabularData {
                headers,
                rows,
                row_count,
                column_count,
            },
            metadata: ParseMetadata {
                parsed_at: Utc::now(),
                parser_version: parser_version.into(),
            },
        }
    }

    /// Value of `column` in row `index`, if present
    pub fn cell(&self, index: usize, column: &str) -> Option<&str> {
        self.data
            .rows
            .get(index)
            .and_then(|row| row.get(column))
            .map(String::as_str)
    }
}
