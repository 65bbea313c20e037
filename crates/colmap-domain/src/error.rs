//! Parser error taxonomy
//!
//! Parsers report tagged variants so callers can classify failures without
//! inspecting message text.

use thiserror::Error;

/// Errors a [`crate::traits::DataParser`] may report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No parser handles this file type
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Requested worksheet does not exist (or the format has no sheets)
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// File bytes are not valid text in the expected encoding
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// File has no header row
    #[error("File is empty: {0}")]
    Empty(String),

    /// Structural problem in the file contents
    #[error("Malformed file: {0}")]
    Malformed(String),
}

impl ParseError {
    /// Whether this error means the format itself is not handled
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, ParseError::UnsupportedFormat(_))
    }
}
