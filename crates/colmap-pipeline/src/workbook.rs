//! Workbook parser for Office Open XML spreadsheets (.xlsx, .xlsm)
//!
//! A workbook is a zip archive of XML parts. The parts read here:
//!
//! ```text
//! xl/workbook.xml              sheet names, in tab order, with relationship ids
//! xl/_rels/workbook.xml.rels   relationship id -> worksheet part
//! xl/sharedStrings.xml         string table referenced by `t="s"` cells
//! xl/worksheets/sheetN.xml     <sheetData><row><c r="B2" t="s"><v>3</v></c>...
//! ```
//!
//! Cell values are taken as stored. Dates stay Excel serial numbers since
//! number formats in `styles.xml` are not consulted.

use crate::parser::{build_table, extension};
use colmap_domain::{DataParser, DataSource, NormalizedData, ParseError, ParseOptions};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm"];

/// Upper bound on a single decompressed XML part
const MAX_XML_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Column limit of the format (XFD)
const MAX_COLUMNS: usize = 16_384;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Parses the worksheets of `.xlsx` and `.xlsm` workbooks
///
/// - Reads the sheet named by `sheet_name`, or the first sheet in tab order
/// - Shared, inline and formula-cached strings are resolved; booleans
///   become `TRUE`/`FALSE`
/// - Cells are placed by their `r` reference, so skipped cells become
///   empty strings
/// - Header and row normalization match [`DelimitedParser`](crate::DelimitedParser)
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkbookParser;

impl WorkbookParser {
    /// Create a parser
    pub fn new() -> Self {
        Self
    }
}

struct SheetEntry {
    name: String,
    path: String,
}

impl DataParser for WorkbookParser {
    fn parse(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ParseOptions,
    ) -> Result<NormalizedData, ParseError> {
        let ext = extension(filename).unwrap_or_default();
        if !WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ParseError::UnsupportedFormat(filename.to_string()));
        }

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            ParseError::Malformed(format!("{} is not a workbook archive: {}", filename, e))
        })?;

        let sheets = list_sheets(&mut archive)?;
        let sheet = match &options.sheet_name {
            Some(wanted) => sheets.iter().find(|s| &s.name == wanted).ok_or_else(|| {
                let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
                ParseError::SheetNotFound(format!(
                    "'{}' is not in {} (sheets: {})",
                    wanted,
                    filename,
                    names.join(", ")
                ))
            })?,
            None => sheets
                .first()
                .ok_or_else(|| ParseError::Empty(filename.to_string()))?,
        };

        let shared = read_shared_strings(&mut archive)?;
        let xml = read_entry(&mut archive, &sheet.path)?;
        let records = read_sheet_rows(&xml, &shared, &sheet.path)?;

        tracing::debug!(
            "Workbook '{}': reading sheet '{}' of {}",
            filename,
            sheet.name,
            sheets.len()
        );

        build_table(
            DataSource {
                filename: filename.to_string(),
                source_type: ext,
                sheet: Some(sheet.name.clone()),
            },
            records,
        )
    }

    fn supports(&self, filename: &str) -> bool {
        extension(filename).is_some_and(|ext| WORKBOOK_EXTENSIONS.contains(&ext.as_str()))
    }
}

fn malformed(part: &str, err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed(format!("{}: {}", part, err))
}

fn has_entry(archive: &Archive<'_>, name: &str) -> bool {
    archive.file_names().any(|n| n == name)
}

/// Read one archive part, refusing parts that inflate past the limit
fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ParseError> {
    let entry = archive.by_name(name).map_err(|e| malformed(name, e))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| malformed(name, e))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(malformed(name, "part exceeds size limit"));
    }
    Ok(out)
}

/// Value of the attribute whose local name is `local`
fn attribute(e: &BytesStart<'_>, local: &[u8], part: &str) -> Result<Option<String>, ParseError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(part, err))?;
        if attr.key.local_name().as_ref() == local {
            let value = attr.unescape_value().map_err(|err| malformed(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Worksheets in tab order with the archive path of each
fn list_sheets(archive: &mut Archive<'_>) -> Result<Vec<SheetEntry>, ParseError> {
    const WORKBOOK: &str = "xl/workbook.xml";
    const RELS: &str = "xl/_rels/workbook.xml.rels";

    let targets = if has_entry(archive, RELS) {
        read_relationships(&read_entry(archive, RELS)?, RELS)?
    } else {
        HashMap::new()
    };

    let xml = read_entry(archive, WORKBOOK)?;
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| malformed(WORKBOOK, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(&e, b"name", WORKBOOK)?
                    .ok_or_else(|| malformed(WORKBOOK, "sheet without a name"))?;
                let path = attribute(&e, b"id", WORKBOOK)?
                    .and_then(|id| targets.get(&id).cloned())
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", sheets.len() + 1));
                sheets.push(SheetEntry { name, path });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

/// Relationship id to archive path, for the workbook's parts
fn read_relationships(xml: &[u8], part: &str) -> Result<HashMap<String, String>, ParseError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| malformed(part, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) =
                    (attribute(&e, b"Id", part)?, attribute(&e, b"Target", part)?)
                {
                    targets.insert(id, resolve_target(&target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Targets are relative to `xl/` unless absolute within the package
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

/// The shared string table; empty when the workbook has none
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ParseError> {
    const PART: &str = "xl/sharedStrings.xml";
    if !has_entry(archive, PART) {
        return Ok(Vec::new());
    }

    let xml = read_entry(archive, PART)?;
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // phonetic runs repeat the reading of the text; skip them
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| malformed(PART, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text => {
                current.push_str(&t.unescape().map_err(|e| malformed(PART, e))?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Zero-based column of a cell reference such as `AB12`
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let number = letters
        .iter()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A') + 1);
    Some(number - 1)
}

struct PendingCell {
    column: usize,
    kind: Option<String>,
}

/// Rows of a worksheet as positional records
fn read_sheet_rows(xml: &[u8], shared: &[String], part: &str) -> Result<Vec<Vec<String>>, ParseError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut next_column = 0;
    let mut cell: Option<PendingCell> = None;
    let mut value = String::new();
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| malformed(part, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row.clear();
                    next_column = 0;
                }
                b"c" => {
                    let column = match attribute(&e, b"r", part)? {
                        Some(r) => column_index(&r)
                            .ok_or_else(|| malformed(part, format!("bad cell reference '{}'", r)))?,
                        None => next_column,
                    };
                    if column >= MAX_COLUMNS {
                        return Err(malformed(part, format!("column {} out of range", column + 1)));
                    }
                    cell = Some(PendingCell {
                        column,
                        kind: attribute(&e, b"t", part)?,
                    });
                    value.clear();
                }
                b"v" | b"t" if cell.is_some() => in_value = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                next_column = match attribute(&e, b"r", part)? {
                    Some(r) => column_index(&r).map_or(next_column + 1, |c| c + 1),
                    None => next_column + 1,
                };
            }
            Event::Text(t) if in_value => {
                value.push_str(&t.unescape().map_err(|e| malformed(part, e))?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        let text = cell_text(done.kind.as_deref(), &value, shared, part)?;
                        if row.len() <= done.column {
                            row.resize(done.column + 1, String::new());
                        }
                        row[done.column] = text;
                        next_column = done.column + 1;
                    }
                }
                b"row" => records.push(std::mem::take(&mut row)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(records)
}

fn cell_text(kind: Option<&str>, raw: &str, shared: &[String], part: &str) -> Result<String, ParseError> {
    match kind {
        Some("s") => {
            let index: usize = raw
                .trim()
                .parse()
                .map_err(|_| malformed(part, format!("bad shared string index '{}'", raw)))?;
            shared
                .get(index)
                .cloned()
                .ok_or_else(|| malformed(part, format!("shared string {} out of range", index)))
        }
        Some("b") => Ok(if raw.trim() == "1" { "TRUE" } else { "FALSE" }.to_string()),
        _ => Ok(raw.to_string()),
    }
}
