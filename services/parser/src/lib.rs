//! Parser - Turns spreadsheet exports into canonical time-series tables
//!
//! Pipeline, one sheet at a time:
//! - Load CSV/workbook bytes into a raw cell matrix (`sheet`)
//! - Resolve the header and tag column roles (`schema`)
//! - Parse period tokens and build the comparison axis (`dates`)
//! - Coerce cells to nullable numbers (`numeric`)
//! - Assemble the sparse (entity, metric, period) table (`table`)
//!
//! Every stage is a pure function of the previous one. Sheets share no state,
//! so different sheets may be normalized concurrently.

pub mod cache;
pub mod config;
pub mod dates;
pub mod error;
pub mod numeric;
pub mod schema;
pub mod sheet;
pub mod table;

use chrono::NaiveDate;

pub use cache::{ingest, NoCache, Snapshot, SnapshotCache, TtlCache};
pub use config::SheetConfig;
pub use dates::{AxisKey, DateAxis, PeriodKey};
pub use error::{Diagnostic, Error, Result};
pub use schema::{CanonicalColumn, ColumnRole, ResolvedSchema};
pub use sheet::{Cell, RawSheet, SourceFile, SourceFormat};
pub use table::{Entity, EntityTable, MetricRecord};

/// Resolve the schema of a raw sheet and build its entity table
pub fn normalize(sheet: &RawSheet, config: &SheetConfig, as_of: Option<NaiveDate>) -> Result<EntityTable> {
    let schema = schema::resolve(sheet, config)?;
    table::build(sheet, &schema, config, as_of)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // END-TO-END TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_normalize_csv_with_banner_row() {
        let csv = "\u{feff}Outstanding as on 03-Nov-24;;\n\
                   Branch Name;Balance_03-Nov-24;Balance_27-Oct-24\n\
                   Kota;1234;900\n\
                   Ajmer;-;450\n";
        let sheet = RawSheet::from_csv_bytes(csv.as_bytes(), None).unwrap();
        let config = SheetConfig::default().with_metrics(["Balance"]);
        let table = normalize(&sheet, &config, None).unwrap();

        assert_eq!(table.entities().len(), 2);
        assert_eq!(table.axis().labels(), vec!["03-Nov-24", "27-Oct-24"]);
        assert_eq!(table.diagnostics()[0].kind(), "header_promoted");
        let nov = PeriodKey::Dated(NaiveDate::from_ymd_opt(2024, 11, 3).unwrap());
        assert_eq!(table.value("ajmer", "Balance", &nov), None);
        assert!(table.record("ajmer", "Balance", &nov).is_some());
        assert_eq!(table.value("kota", "Balance", &nov), Some(1234.0));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Balance_03-Nov-24", "Balance_27-Oct-24"],
            vec!["Kota", "80", "100"],
            vec!["Ajmer", "40", "abc"],
        ]);
        let config = SheetConfig::default().with_metrics(["Balance"]);
        let first = normalize(&sheet, &config, None).unwrap();
        let second = normalize(&sheet, &config, None).unwrap();
        assert_eq!(first.records(), second.records());
        assert_eq!(first, second);
    }
}
