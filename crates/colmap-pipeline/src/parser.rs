//! Upload parsers: delimited text, and routing by file extension

use crate::workbook::WorkbookParser;
use colmap_domain::{DataParser, DataSource, NormalizedData, ParseError, ParseOptions, Row};
use std::collections::HashSet;
use std::path::Path;

pub(crate) const PARSER_VERSION: &str = env!("CARGO_PKG_VERSION");

const LEGACY_WORKBOOK_EXTENSIONS: &[&str] = &["xls", "xlsb", "ods"];

/// Parses any upload this service accepts
///
/// `.csv`, `.tsv` and `.tab` go to [`DelimitedParser`]; `.xlsx` and
/// `.xlsm` go to [`WorkbookParser`]. Everything else is
/// `UnsupportedFormat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadParser {
    delimited: DelimitedParser,
    workbook: WorkbookParser,
}

impl UploadParser {
    /// Create a parser
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataParser for UploadParser {
    fn parse(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ParseOptions,
    ) -> Result<NormalizedData, ParseError> {
        if self.delimited.supports(filename) {
            return self.delimited.parse(bytes, filename, options);
        }
        if self.workbook.supports(filename) {
            return self.workbook.parse(bytes, filename, options);
        }

        let ext = extension(filename).unwrap_or_default();
        if LEGACY_WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ParseError::UnsupportedFormat(format!(
                "{}: only .xlsx and .xlsm workbooks are supported, save the sheet as .xlsx or CSV",
                filename
            )));
        }
        Err(ParseError::UnsupportedFormat(filename.to_string()))
    }

    fn supports(&self, filename: &str) -> bool {
        self.delimited.supports(filename) || self.workbook.supports(filename)
    }
}

/// Parses comma- and tab-separated files
///
/// - UTF-8 only; a leading byte-order mark is dropped
/// - Quoted fields may contain separators, doubled quotes and newlines
/// - The first non-empty record is the header row; blank header cells are
///   named `Column{n}` (1-based) and repeated names get a `_{k}` suffix
/// - Empty records are skipped; short rows are padded with empty strings
///   and long rows truncated to the header width
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedParser;

impl DelimitedParser {
    /// Create a parser
    pub fn new() -> Self {
        Self
    }
}

/// Lowercased extension of `filename`
pub(crate) fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn separator_for(ext: &str) -> Option<char> {
    match ext {
        "csv" => Some(','),
        "tsv" | "tab" => Some('\t'),
        _ => None,
    }
}

impl DataParser for DelimitedParser {
    fn parse(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ParseOptions,
    ) -> Result<NormalizedData, ParseError> {
        let ext = extension(filename).unwrap_or_default();
        let separator = separator_for(&ext)
            .ok_or_else(|| ParseError::UnsupportedFormat(filename.to_string()))?;

        if let Some(sheet) = &options.sheet_name {
            return Err(ParseError::SheetNotFound(format!(
                "{} has no worksheets (requested '{}')",
                filename, sheet
            )));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| ParseError::InvalidEncoding(format!("{} is not valid UTF-8: {}", filename, e)))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let records = read_records(text, separator)?;
        build_table(
            DataSource {
                filename: filename.to_string(),
                source_type: ext,
                sheet: None,
            },
            records,
        )
    }

    fn supports(&self, filename: &str) -> bool {
        extension(filename).as_deref().and_then(separator_for).is_some()
    }
}

/// Turn raw records into a table
///
/// Empty records are skipped, the first remaining one is the header row,
/// and data rows are padded or truncated to the header width.
pub(crate) fn build_table(source: DataSource, records: Vec<Vec<String>>) -> Result<NormalizedData, ParseError> {
    let mut records = records
        .into_iter()
        .filter(|record| record.iter().any(|cell| !cell.is_empty()));

    let header_record = records
        .next()
        .ok_or_else(|| ParseError::Empty(source.filename.clone()))?;
    let headers = normalize_headers(header_record);

    let rows: Vec<Row> = records
        .map(|record| {
            let mut cells = record.into_iter();
            headers
                .iter()
                .map(|h| (h.clone(), cells.next().unwrap_or_default()))
                .collect()
        })
        .collect();

    tracing::debug!(
        "Parsed '{}': {} columns, {} rows",
        source.filename,
        headers.len(),
        rows.len()
    );

    Ok(NormalizedData::new(source, headers, rows, PARSER_VERSION))
}

fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(idx, cell)| {
            let trimmed = cell.trim();
            let base = if trimmed.is_empty() {
                format!("Column{}", idx + 1)
            } else {
                trimmed.to_string()
            };

            let mut name = base.clone();
            let mut k = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, k);
                k += 1;
            }
            name
        })
        .collect()
}

/// Split `text` into records of fields
fn read_records(text: &str, separator: char) -> Result<Vec<Vec<String>>, ParseError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut line = 1;
    let mut quote_line = 0;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => {
                    if c == '\n' {
                        line += 1;
                    }
                    field.push(c);
                }
            }
            continue;
        }

        match c {
            '"' if at_field_start => {
                in_quotes = true;
                quote_line = line;
                at_field_start = false;
            }
            c if c == separator => {
                record.push(std::mem::take(&mut field));
                at_field_start = true;
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                line += 1;
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                at_field_start = true;
            }
            _ => {
                field.push(c);
                at_field_start = false;
            }
        }
    }

    if in_quotes {
        return Err(ParseError::Malformed(format!(
            "unterminated quoted field starting on line {}",
            quote_line
        )));
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}
