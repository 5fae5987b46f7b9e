//! Raw sheet loading
//!
//! Turns CSV or workbook bytes into a `RawSheet`: an ordered matrix of
//! text/number/date/blank cells. Nothing here interprets the cells; header
//! detection and typing happen in later stages.

use std::borrow::Cow;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::SheetConfig;
use crate::error::{Error, Result};

static BLANK: Cell = Cell::Blank;

/// One raw cell as delivered by the source file
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Blank,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        matches!(self, Cell::Blank)
    }

    /// Cell rendered as a trimmed label (used for headers and identity values)
    pub fn as_label(&self) -> String {
        match self {
            Cell::Blank => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Ordered matrix of cells for one sheet. Rows may have different lengths.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSheet {
    rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a sheet from plain strings; empty strings become blank cells
    pub fn from_text_rows<R, S>(rows: &[R]) -> Self
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let rows = rows
            .iter()
            .map(|row| {
                row.as_ref()
                    .iter()
                    .map(|s| {
                        let s = s.as_ref();
                        if s.is_empty() {
                            Cell::Blank
                        } else {
                            Cell::Text(s.to_string())
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell at (row, col); anything past the end of a row reads as blank
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&BLANK)
    }

    /// Load a sheet from a source file, choosing the reader by file name
    pub fn load(source: &SourceFile, config: &SheetConfig) -> Result<Self> {
        let sheet = match source.format() {
            SourceFormat::Workbook => {
                Self::from_workbook_bytes(source.bytes.clone(), config.sheet_name.as_deref())?
            }
            SourceFormat::Csv => Self::from_csv_bytes(&source.bytes, config.delimiter)?,
        };

        if sheet.rows.is_empty() {
            return Err(Error::EmptySheet);
        }

        debug!(
            source = %source.name,
            rows = sheet.rows.len(),
            "loaded raw sheet"
        );
        Ok(sheet)
    }

    /// Parse CSV bytes. Delimiter is sniffed from the first line when not given.
    pub fn from_csv_bytes(bytes: &[u8], delimiter: Option<char>) -> Result<Self> {
        let text = decode_text(bytes);
        let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&text));
        let delimiter = u8::try_from(delimiter).unwrap_or(b',');

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            // Skip fully empty lines
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            let row = record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Cell::Blank
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect();
            rows.push(row);
        }

        Ok(Self { rows })
    }

    /// Parse workbook bytes (xls, xlsx, xlsb, ods; calamine auto-detects)
    pub fn from_workbook_bytes(bytes: Vec<u8>, sheet_name: Option<&str>) -> Result<Self> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

        let sheet_names = workbook.sheet_names().to_vec();
        let name = match sheet_name {
            Some(wanted) => sheet_names
                .iter()
                .find(|s| s.trim().eq_ignore_ascii_case(wanted.trim()))
                .cloned()
                .ok_or_else(|| Error::SheetNotFound(wanted.to_string()))?,
            None => sheet_names.first().cloned().ok_or(Error::NoSheets)?,
        };

        debug!(sheet = %name, available = sheet_names.len(), "reading worksheet");

        let range = workbook.worksheet_range(&name)?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect::<Vec<_>>())
            .filter(|row: &Vec<Cell>| row.iter().any(|c| !c.is_blank()))
            .collect();

        Ok(Self { rows })
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Blank,
        Data::String(s) if s.trim().is_empty() => Cell::Blank,
        Data::String(s) => Cell::Text(s.trim().to_string()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => Cell::Date(ndt.date()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

/// Decode file bytes: strip a UTF-8 BOM, fall back to Windows-1252
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text
        }
    }
}

/// Most frequent of `,` `;` and tab on the first line; comma on a tie
fn sniff_delimiter(text: &str) -> char {
    let first_line = text.lines().next().unwrap_or("");
    [';', '\t']
        .into_iter()
        .map(|d| (d, first_line.matches(d).count()))
        .fold((',', first_line.matches(',').count()), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
        .0
}

// =============================================================================
// SOURCE FILES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Workbook,
}

impl SourceFormat {
    /// Detect format from the file name extension
    pub fn detect(name: &str) -> Self {
        let lower = name.to_lowercase();
        let is_workbook = [".xls", ".xlsx", ".xlsm", ".xlsb", ".ods"]
            .iter()
            .any(|ext| lower.ends_with(ext));
        if is_workbook {
            SourceFormat::Workbook
        } else {
            SourceFormat::Csv
        }
    }
}

/// A fetched export: its name (path or URL) and raw bytes
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn format(&self) -> SourceFormat {
        SourceFormat::detect(&self.name)
    }

    /// Content hash in the form `sha256:<hex>`
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("sha256:{:x}", hasher.finalize())
    }
}
