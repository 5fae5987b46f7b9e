//! Column schema resolution
//!
//! Validation pass only: decides where the header is, repairs it against the
//! template, deduplicates labels and tags every column with a typed role.
//! Body cells are never inspected here; the table builder consumes the
//! resulting schema.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::config::SheetConfig;
use crate::dates::parse_date_token;
use crate::error::{Diagnostic, Error, Result};
use crate::sheet::{Cell, RawSheet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ColumnRole {
    /// Primary key of the row subject (branch, account, ...)
    Identity,
    /// Named quantity; `period` is the raw date token embedded in the label
    Metric {
        metric: String,
        period: Option<String>,
    },
    /// Dedicated date column (long layout)
    Date,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalColumn {
    /// Deduplicated label
    pub label: String,
    /// Label before deduplication
    pub source_label: String,
    pub role: ColumnRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    pub columns: Vec<CanonicalColumn>,
    /// Sheet row holding the header
    pub header_row: usize,
    /// First sheet row of the data body
    pub body_start: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolvedSchema {
    pub fn identity_index(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.role == ColumnRole::Identity)
    }

    pub fn date_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.role == ColumnRole::Date)
    }

    pub fn labels(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label.clone()).collect()
    }
}

/// Resolve the header row and column roles of a raw sheet
pub fn resolve(sheet: &RawSheet, config: &SheetConfig) -> Result<ResolvedSchema> {
    let rows = sheet.rows();
    let first = rows.first().ok_or(Error::EmptySheet)?;
    let mut diagnostics = Vec::new();

    // Row 0 is the header if its first cell names the identity column.
    // Otherwise it is a banner and the next row is promoted, unless that row
    // has no identity label while row 0 has one elsewhere (long layout).
    let first_label = first.first().map(Cell::as_label).unwrap_or_default();
    let keep_first = config.is_identity(&first_label)
        || rows.len() < 2
        || (has_identity_label(first, config) && !has_identity_label(&rows[1], config));
    let header_row = if keep_first {
        0
    } else {
        diagnostics.push(Diagnostic::HeaderPromoted {
            row: 2,
            found: first_label,
        });
        1
    };

    let mut labels: Vec<String> = rows[header_row].iter().map(Cell::as_label).collect();
    apply_template(&mut labels, config.template.as_deref(), &mut diagnostics);
    let deduped = dedupe_labels(&labels);

    let mut identity_taken = false;
    let mut date_taken = false;
    let columns: Vec<CanonicalColumn> = labels
        .into_iter()
        .zip(deduped)
        .map(|(source_label, label)| {
            let role = assign_role(&source_label, config, &mut identity_taken, &mut date_taken);
            CanonicalColumn {
                label,
                source_label,
                role,
            }
        })
        .collect();

    if !identity_taken {
        return Err(Error::SchemaMismatch {
            labels: columns.iter().map(|c| c.label.clone()).collect(),
        });
    }

    debug!(
        header_row,
        columns = columns.len(),
        metrics = columns
            .iter()
            .filter(|c| matches!(c.role, ColumnRole::Metric { .. }))
            .count(),
        "resolved column schema"
    );

    Ok(ResolvedSchema {
        columns,
        header_row,
        body_start: header_row + 1,
        diagnostics,
    })
}

fn has_identity_label(row: &[Cell], config: &SheetConfig) -> bool {
    row.iter().any(|cell| config.is_identity(&cell.as_label()))
}

/// Truncate or pad the header to the template length; fill blank labels
fn apply_template(
    labels: &mut Vec<String>,
    template: Option<&[String]>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Some(template) = template.filter(|t| !t.is_empty()) {
        if labels.len() != template.len() {
            diagnostics.push(Diagnostic::TemplateAdjusted {
                found: labels.len(),
                expected: template.len(),
            });
            labels.truncate(template.len());
            let missing = template[labels.len()..].to_vec();
            labels.extend(missing);
        }
    }

    for (idx, label) in labels.iter_mut().enumerate() {
        if label.is_empty() {
            *label = template
                .and_then(|t| t.get(idx))
                .filter(|t| !t.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| format!("Unnamed: {}", idx));
        }
    }
}

/// Append `_1`, `_2`, ... to repeated labels, keeping column order
fn dedupe_labels(labels: &[String]) -> Vec<String> {
    let originals: HashSet<&str> = labels.iter().map(String::as_str).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut counters: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::with_capacity(labels.len());

    for label in labels {
        if seen.insert(label.clone()) {
            out.push(label.clone());
            continue;
        }

        let counter = counters.entry(label.as_str()).or_insert(0);
        let candidate = loop {
            *counter += 1;
            let candidate = format!("{}_{}", label, counter);
            if !seen.contains(&candidate) && !originals.contains(candidate.as_str()) {
                break candidate;
            }
        };
        seen.insert(candidate.clone());
        out.push(candidate);
    }

    out
}

fn assign_role(
    label: &str,
    config: &SheetConfig,
    identity_taken: &mut bool,
    date_taken: &mut bool,
) -> ColumnRole {
    if !*identity_taken && config.is_identity(label) {
        *identity_taken = true;
        return ColumnRole::Identity;
    }

    if !*date_taken && config.is_date_column(label) {
        *date_taken = true;
        return ColumnRole::Date;
    }

    if let Some(metric) = config.metric_name(label) {
        return ColumnRole::Metric {
            metric: metric.to_string(),
            period: None,
        };
    }

    // Bare date label: the period of the default metric
    if parse_date_token(label, &config.date_formats).is_some() {
        return ColumnRole::Metric {
            metric: config.default_metric.clone(),
            period: Some(label.trim().to_string()),
        };
    }

    // "<metric><sep><date token>", split at the last separator
    let separator = config.label_separator.as_str();
    if separator.is_empty() {
        return ColumnRole::Unknown;
    }
    if let Some((prefix, suffix)) = label.rsplit_once(separator) {
        let prefix = prefix.trim();
        let suffix = suffix.trim();
        if prefix.is_empty() || suffix.is_empty() {
            return ColumnRole::Unknown;
        }
        if let Some(metric) = config.metric_name(prefix) {
            return ColumnRole::Metric {
                metric: metric.to_string(),
                period: Some(suffix.to_string()),
            };
        }
        if parse_date_token(suffix, &config.date_formats).is_some() {
            return ColumnRole::Metric {
                metric: prefix.to_string(),
                period: Some(suffix.to_string()),
            };
        }
    }

    ColumnRole::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SheetConfig {
        SheetConfig::default().with_metrics(["Balance", "Pending"])
    }

    fn metric(name: &str, period: Option<&str>) -> ColumnRole {
        ColumnRole::Metric {
            metric: name.to_string(),
            period: period.map(str::to_string),
        }
    }

    // -------------------------------------------------------------------------
    // HEADER DETECTION TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_row_zero_is_header_when_first_cell_is_identity() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Balance_03-Nov-24"],
            vec!["Kota", "100"],
        ]);
        let schema = resolve(&sheet, &config()).unwrap();
        assert_eq!(schema.header_row, 0);
        assert_eq!(schema.body_start, 1);
        assert!(schema.diagnostics.is_empty());
    }

    #[test]
    fn test_banner_row_is_skipped_and_next_row_promoted() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Outstanding report as of 03-Nov-24", ""],
            vec!["Branch Name", "Balance_03-Nov-24"],
            vec!["Kota", "100"],
        ]);
        let schema = resolve(&sheet, &config()).unwrap();
        assert_eq!(schema.header_row, 1);
        assert_eq!(schema.body_start, 2);
        assert_eq!(schema.identity_index(), Some(0));
        assert_eq!(schema.diagnostics[0].kind(), "header_promoted");
    }

    #[test]
    fn test_missing_identity_is_schema_mismatch() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Title", ""],
            vec!["Region", "Balance"],
            vec!["North", "1"],
        ]);
        let result = resolve(&sheet, &config());
        match result {
            Err(Error::SchemaMismatch { labels }) => {
                assert_eq!(labels, vec!["Region".to_string(), "Balance".to_string()]);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_sheet_fails() {
        let sheet = RawSheet::new(Vec::new());
        assert!(matches!(resolve(&sheet, &config()), Err(Error::EmptySheet)));
    }

    // -------------------------------------------------------------------------
    // TEMPLATE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_short_header_padded_from_template() {
        let mut config = config();
        config.template = Some(vec![
            "Branch Name".into(),
            "Balance_03-Nov-24".into(),
            "Pending_03-Nov-24".into(),
        ]);
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Balance_03-Nov-24"],
            vec!["Kota", "100", "5"],
        ]);
        let schema = resolve(&sheet, &config).unwrap();
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.columns[2].label, "Pending_03-Nov-24");
        assert_eq!(schema.columns[2].role, metric("Pending", Some("03-Nov-24")));
        assert_eq!(schema.diagnostics[0].kind(), "template_adjusted");
    }

    #[test]
    fn test_long_header_truncated_to_template() {
        let mut config = config();
        config.template = Some(vec!["Branch Name".into(), "Balance_03-Nov-24".into()]);
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Balance_03-Nov-24", "Remarks", "Extra"],
            vec!["Kota", "100", "ok", "x"],
        ]);
        let schema = resolve(&sheet, &config).unwrap();
        assert_eq!(schema.labels(), vec!["Branch Name", "Balance_03-Nov-24"]);
    }

    #[test]
    fn test_blank_labels_filled() {
        let mut config = config();
        config.template = Some(vec!["Branch Name".into(), "Balance".into(), "Region".into()]);
        let sheet = RawSheet::from_text_rows(&[vec!["Branch Name", "", "Region"], vec!["Kota", "1", "N"]]);
        let schema = resolve(&sheet, &config).unwrap();
        assert_eq!(schema.columns[1].label, "Balance");
        assert_eq!(schema.columns[1].role, metric("Balance", None));

        let sheet = RawSheet::from_text_rows(&[vec!["Branch Name", ""], vec!["Kota", "1"]]);
        let schema = resolve(&sheet, &SheetConfig::default()).unwrap();
        assert_eq!(schema.columns[1].label, "Unnamed: 1");
        assert_eq!(schema.columns[1].role, ColumnRole::Unknown);
    }

    // -------------------------------------------------------------------------
    // DEDUPLICATION TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_dedupe_appends_incrementing_suffix() {
        let labels: Vec<String> = ["A", "B", "A", "A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dedupe_labels(&labels), vec!["A", "B", "A_1", "A_2"]);
    }

    #[test]
    fn test_dedupe_skips_colliding_suffix() {
        let labels: Vec<String> = ["A", "A", "A_1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dedupe_labels(&labels), vec!["A", "A_2", "A_1"]);
    }

    #[test]
    fn test_duplicate_metric_columns_keep_role_from_source_label() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Balance_03-Nov-24", "Balance_03-Nov-24"],
            vec!["Kota", "1", "1"],
        ]);
        let schema = resolve(&sheet, &config()).unwrap();
        assert_eq!(schema.columns[2].label, "Balance_03-Nov-24_1");
        assert_eq!(schema.columns[2].source_label, "Balance_03-Nov-24");
        assert_eq!(schema.columns[2].role, metric("Balance", Some("03-Nov-24")));
    }

    // -------------------------------------------------------------------------
    // ROLE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_roles_wide_layout() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Balance_03-Nov-24", "Pending_27-Oct-24", "Region", "Collected_2024-11-03"],
            vec!["Kota", "1", "2", "North", "3"],
        ]);
        let schema = resolve(&sheet, &config()).unwrap();
        let roles: Vec<_> = schema.columns.iter().map(|c| c.role.clone()).collect();
        assert_eq!(
            roles,
            vec![
                ColumnRole::Identity,
                metric("Balance", Some("03-Nov-24")),
                metric("Pending", Some("27-Oct-24")),
                ColumnRole::Unknown,
                // unconfigured prefix, but the suffix is a date
                metric("Collected", Some("2024-11-03")),
            ]
        );
    }

    #[test]
    fn test_roles_long_layout() {
        let config = SheetConfig::default().with_metrics(["Invoice", "Collection", "Outstanding"]);
        let sheet = RawSheet::from_text_rows(&[
            vec!["Date", "Branch Name", "Invoice", "Collection", "Outstanding", "Region"],
            vec!["2024-01-01", "Kota", "100", "90", "10", "North"],
        ]);
        // Date comes first, but the next row holds no identity label
        let schema = resolve(&sheet, &config).unwrap();
        assert_eq!(schema.header_row, 0);
        assert!(schema.diagnostics.is_empty());
        assert_eq!(schema.date_index(), Some(0));
        assert_eq!(schema.identity_index(), Some(1));
        assert_eq!(schema.columns[2].role, metric("Invoice", None));
        assert_eq!(schema.columns[5].role, ColumnRole::Unknown);
    }

    #[test]
    fn test_banner_mentioning_identity_still_promoted() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Report", "Branch"],
            vec!["Branch Name", "Balance_03-Nov-24"],
            vec!["Kota", "1"],
        ]);
        let schema = resolve(&sheet, &config()).unwrap();
        assert_eq!(schema.header_row, 1);
    }

    #[test]
    fn test_bare_date_labels_use_default_metric() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "03-Nov-24", "27-Oct-24"],
            vec!["Kota", "80", "100"],
        ]);
        let schema = resolve(&sheet, &config()).unwrap();
        assert_eq!(schema.columns[1].role, metric("Value", Some("03-Nov-24")));
        assert_eq!(schema.columns[2].role, metric("Value", Some("27-Oct-24")));
    }

    #[test]
    fn test_underscored_metric_prefix_matches_configured_name() {
        let config = SheetConfig::default().with_metrics(["Pending Amount"]);
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Pending_Amount_03-Nov-24"],
            vec!["Kota", "1"],
        ]);
        let schema = resolve(&sheet, &config).unwrap();
        assert_eq!(schema.columns[1].role, metric("Pending Amount", Some("03-Nov-24")));
    }

    #[test]
    fn test_configured_metric_with_unparseable_suffix_keeps_token() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Balance_Q3"],
            vec!["Kota", "1"],
        ]);
        let schema = resolve(&sheet, &config()).unwrap();
        assert_eq!(schema.columns[1].role, metric("Balance", Some("Q3")));
    }

    #[test]
    fn test_second_identity_column_is_unknown() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Branch"],
            vec!["Kota", "KOT"],
        ]);
        let schema = resolve(&sheet, &config()).unwrap();
        assert_eq!(schema.columns[0].role, ColumnRole::Identity);
        assert_eq!(schema.columns[1].role, ColumnRole::Unknown);
    }
}
