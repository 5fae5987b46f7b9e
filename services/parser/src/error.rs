//! Error taxonomy for sheet ingestion
//!
//! Two kinds of problems exist:
//! - `Error`: aborts ingestion of one sheet (the caller decides what to do next)
//! - `Diagnostic`: non-fatal, recorded on the table while the sheet still loads
//!
//! Nothing here is globally fatal. A failed sheet never affects another sheet.

use serde::Serialize;
use thiserror::Error;

/// Fatal for the sheet being ingested
#[derive(Debug, Error)]
pub enum Error {
    #[error("schema mismatch: no identity column among {labels:?}")]
    SchemaMismatch { labels: Vec<String> },

    #[error("sheet is empty")]
    EmptySheet,

    #[error("workbook has no sheets")]
    NoSheets,

    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal finding recorded while normalizing a sheet.
///
/// Row numbers are 1-based sheet rows, the way a spreadsheet user sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("row {row} promoted to header: first cell '{found}' is not an identity column")]
    HeaderPromoted { row: usize, found: String },

    #[error("header has {found} columns but template expects {expected}; adjusted from template")]
    TemplateAdjusted { found: usize, expected: usize },

    #[error("column '{column}': '{token}' is not a date, kept as non-temporal key")]
    DateParseFailure { column: String, token: String },

    #[error("row {row}, column '{column}': '{raw}' is not a number, stored as null")]
    ValueCoercionFailure {
        row: usize,
        column: String,
        raw: String,
    },

    #[error("conflicting values for {entity} / {metric} / {period}: column '{column}' wins")]
    ConflictingDateKeys {
        entity: String,
        metric: String,
        period: String,
        column: String,
    },

    #[error("entity '{entity}' repeated at row {row}; overwrites row {previous_row}")]
    DuplicateEntity {
        entity: String,
        row: usize,
        previous_row: usize,
    },

    #[error("row {row} has no identity value, skipped")]
    MissingIdentity { row: usize },
}

impl Diagnostic {
    /// Short machine-friendly name of the diagnostic kind
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::HeaderPromoted { .. } => "header_promoted",
            Diagnostic::TemplateAdjusted { .. } => "template_adjusted",
            Diagnostic::DateParseFailure { .. } => "date_parse_failure",
            Diagnostic::ValueCoercionFailure { .. } => "value_coercion_failure",
            Diagnostic::ConflictingDateKeys { .. } => "conflicting_date_keys",
            Diagnostic::DuplicateEntity { .. } => "duplicate_entity",
            Diagnostic::MissingIdentity { .. } => "missing_identity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_message_lists_labels() {
        let err = Error::SchemaMismatch {
            labels: vec!["Foo".to_string(), "Bar".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("schema mismatch"));
        assert!(msg.contains("Foo"));
    }

    #[test]
    fn test_diagnostic_serializes_with_kind_tag() {
        let diag = Diagnostic::MissingIdentity { row: 4 };
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"], "missing_identity");
        assert_eq!(json["row"], 4);
        assert_eq!(diag.kind(), "missing_identity");
    }
}
