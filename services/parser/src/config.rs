//! Static sheet configuration
//!
//! Known column names are explicit, not inferred from cell contents.
//! Every field has a default so a partial JSON section is enough.

use serde::{Deserialize, Serialize};

/// Ordered list of accepted date formats; the first one that parses wins
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%d-%b-%y", // 03-Nov-24
    "%Y-%m-%d", // 2024-11-03
    "%d/%m/%Y", // 03/11/2024
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d, %Y",
];

pub const DEFAULT_IDENTITY_COLUMNS: &[&str] = &["Branch Name", "Branch"];
pub const DEFAULT_DATE_COLUMNS: &[&str] = &["Date"];
pub const DEFAULT_PLACEHOLDERS: &[&str] = &["-", "None", ""];
pub const DEFAULT_METRIC: &str = "Value";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Names of the primary key column (e.g. "Branch Name")
    pub identity_columns: Vec<String>,
    /// Names of a dedicated date column (long layout)
    pub date_columns: Vec<String>,
    /// Known metric names; labels are mapped onto these spellings
    pub metrics: Vec<String>,
    /// Expected canonical header, used to pad/truncate a mismatched header
    pub template: Option<Vec<String>>,
    pub date_formats: Vec<String>,
    /// Cell texts that mean "no value"
    pub placeholders: Vec<String>,
    /// Separator between metric name and date token in a label ("Balance_03-Nov-24")
    pub label_separator: String,
    /// Metric name for columns labelled with a bare date ("03-Nov-24")
    pub default_metric: String,
    /// CSV delimiter; sniffed from the first line when absent
    pub delimiter: Option<char>,
    /// Worksheet to read; the first sheet when absent
    pub sheet_name: Option<String>,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            identity_columns: to_strings(DEFAULT_IDENTITY_COLUMNS),
            date_columns: to_strings(DEFAULT_DATE_COLUMNS),
            metrics: Vec::new(),
            template: None,
            date_formats: to_strings(DEFAULT_DATE_FORMATS),
            placeholders: to_strings(DEFAULT_PLACEHOLDERS),
            label_separator: "_".to_string(),
            default_metric: DEFAULT_METRIC.to_string(),
            delimiter: None,
            sheet_name: None,
        }
    }
}

impl SheetConfig {
    pub fn is_identity(&self, label: &str) -> bool {
        find_match(label, &self.identity_columns).is_some()
    }

    pub fn is_date_column(&self, label: &str) -> bool {
        find_match(label, &self.date_columns).is_some()
    }

    /// Canonical spelling of a configured metric matching `label`
    pub fn metric_name(&self, label: &str) -> Option<&str> {
        find_match(label, &self.metrics)
    }

    /// Add metric names not already known (case-insensitive)
    pub fn with_metrics<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if self.metric_name(&name).is_none() {
                self.metrics.push(name);
            }
        }
        self
    }
}

/// Normalize a label for comparison: trim, lowercase, collapse whitespace.
/// `_` counts as a space, so "Pending_Amount" matches "Pending Amount".
pub fn normalize_label(label: &str) -> String {
    label
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn find_match<'a>(label: &str, candidates: &'a [String]) -> Option<&'a str> {
    let normalized = normalize_label(label);
    if normalized.is_empty() {
        return None;
    }
    candidates
        .iter()
        .find(|c| normalize_label(c) == normalized)
        .map(String::as_str)
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
