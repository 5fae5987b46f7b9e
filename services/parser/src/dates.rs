//! Date token parsing and the comparison axis
//!
//! Dates come from two places:
//! - tokens embedded in metric column labels ("Balance_03-Nov-24")
//! - a dedicated date column in the data body
//!
//! Tokens that fail every format are kept as non-temporal keys so the sheet
//! still loads. Only dated keys enter the comparison axis.

use std::collections::HashSet;
use std::fmt;

use calamine::{ExcelDateTime, ExcelDateTimeType};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Diagnostic;
use crate::schema::{CanonicalColumn, ColumnRole};
use crate::sheet::Cell;

/// Period a value belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKey {
    Dated(NaiveDate),
    /// Token that is not a date under any configured format
    Label(String),
    /// Metric with no date source at all
    Undated,
}

impl PeriodKey {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            PeriodKey::Dated(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Dated(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            PeriodKey::Label(s) => write!(f, "{}", s),
            PeriodKey::Undated => write!(f, "(undated)"),
        }
    }
}

/// Parse a date token against the ordered format list; first match wins.
///
/// A trailing time of day ("2024-11-03 00:00:00") is ignored.
pub fn parse_date_token(token: &str, formats: &[String]) -> Option<NaiveDate> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if let Some(date) = try_formats(token, formats) {
        return Some(date);
    }

    if token.contains(':') {
        let head = token.split(|c: char| c == ' ' || c == 'T').next()?;
        return try_formats(head, formats);
    }

    None
}

fn try_formats(token: &str, formats: &[String]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
}

/// Period of a date-column cell. `None` for a blank cell.
pub fn parse_date_cell(cell: &Cell, formats: &[String]) -> Option<PeriodKey> {
    match cell {
        Cell::Blank => None,
        Cell::Date(d) => Some(PeriodKey::Dated(*d)),
        // Workbook date cell stored without a date format
        Cell::Number(n) => match serial_date(*n) {
            Some(date) => Some(PeriodKey::Dated(date)),
            None => Some(PeriodKey::Label(cell.as_label())),
        },
        other => {
            let token = other.as_label();
            match parse_date_token(&token, formats) {
                Some(date) => Some(PeriodKey::Dated(date)),
                None => Some(PeriodKey::Label(token)),
            }
        }
    }
}

/// Date of a positive sheet serial number (1900 date system)
fn serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    ExcelDateTime::new(serial, ExcelDateTimeType::DateTime, false)
        .as_datetime()
        .map(|dt| dt.date())
}

/// Period parsed from a metric column label, with the source token
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPeriod {
    pub key: PeriodKey,
    pub token: String,
}

/// Parse the period token of every metric column.
///
/// Returns one entry per column (aligned with `columns`); `None` for columns
/// that carry no token.
pub fn column_periods(
    columns: &[CanonicalColumn],
    formats: &[String],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Option<ColumnPeriod>> {
    columns
        .iter()
        .map(|column| {
            let token = match &column.role {
                ColumnRole::Metric {
                    period: Some(token),
                    ..
                } => token,
                _ => return None,
            };

            let key = match parse_date_token(token, formats) {
                Some(date) => PeriodKey::Dated(date),
                None => {
                    diagnostics.push(Diagnostic::DateParseFailure {
                        column: column.label.clone(),
                        token: token.clone(),
                    });
                    PeriodKey::Label(token.clone())
                }
            };

            Some(ColumnPeriod {
                key,
                token: token.clone(),
            })
        })
        .collect()
}

// =============================================================================
// COMPARISON AXIS
// =============================================================================

/// One dated position on the axis, labelled with its first-seen source token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisKey {
    pub date: NaiveDate,
    pub label: String,
}

/// Dated keys ordered descending (most recent first), plus the non-temporal
/// keys in first-seen order. Adjacent positions are compared downstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DateAxis {
    keys: Vec<AxisKey>,
    non_temporal: Vec<String>,
}

impl DateAxis {
    /// Build from period keys with their source tokens, in encounter order
    pub fn from_periods<'a, I>(periods: I) -> Self
    where
        I: IntoIterator<Item = (&'a PeriodKey, &'a str)>,
    {
        let mut seen_dates = HashSet::new();
        let mut seen_labels = HashSet::new();
        let mut keys = Vec::new();
        let mut non_temporal = Vec::new();

        for (period, token) in periods {
            match period {
                PeriodKey::Dated(date) => {
                    if seen_dates.insert(*date) {
                        keys.push(AxisKey {
                            date: *date,
                            label: token.to_string(),
                        });
                    }
                }
                PeriodKey::Label(label) => {
                    if seen_labels.insert(label.clone()) {
                        non_temporal.push(label.clone());
                    }
                }
                PeriodKey::Undated => {}
            }
        }

        keys.sort_by(|a, b| b.date.cmp(&a.date));
        Self { keys, non_temporal }
    }

    pub fn keys(&self) -> &[AxisKey] {
        &self.keys
    }

    pub fn labels(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.label.as_str()).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.keys.iter().map(|k| k.date).collect()
    }

    pub fn non_temporal(&self) -> &[String] {
        &self.non_temporal
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn latest(&self) -> Option<&AxisKey> {
        self.keys.first()
    }

    pub fn previous(&self) -> Option<&AxisKey> {
        self.keys.get(1)
    }

    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.keys.iter().position(|k| k.date == date)
    }

    /// Adjacent (newer, older) pairs in axis order
    pub fn adjacent_pairs(&self) -> impl Iterator<Item = (&AxisKey, &AxisKey)> {
        self.keys.windows(2).map(|w| (&w[0], &w[1]))
    }
}
