//! Period comparison engine
//!
//! Every adjacent pair of the date axis is compared once per entity/metric
//! and stored in a `ComparisonTable`. Consumers look results up instead of
//! recomputing them per cell.

use std::collections::HashMap;

use chrono::NaiveDate;
use parser::{EntityTable, PeriodKey};
use serde::Serialize;
use tracing::debug;

use crate::polarity::{Polarity, PolarityTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Improved,
    Worsened,
    Unchanged,
    /// A value is null/absent, or the metric has no polarity
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub entity_id: String,
    pub metric_name: String,
    pub date_newer: NaiveDate,
    pub date_older: NaiveDate,
    pub value_newer: Option<f64>,
    pub value_older: Option<f64>,
    pub delta: Option<f64>,
    pub pct_change: Option<f64>,
    pub direction: Direction,
}

/// Compare two values: (delta, pct_change, direction).
///
/// `delta = newer - older`; `pct_change` only when `older != 0`.
pub fn compare_pair(
    newer: Option<f64>,
    older: Option<f64>,
    polarity: Option<Polarity>,
) -> (Option<f64>, Option<f64>, Direction) {
    let (newer, older) = match (newer, older) {
        (Some(n), Some(o)) => (n, o),
        _ => return (None, None, Direction::Unknown),
    };

    let delta = newer - older;
    let pct_change = if older != 0.0 {
        Some(delta / older * 100.0)
    } else {
        None
    };
    let direction = polarity.map_or(Direction::Unknown, |p| p.classify(delta));
    (Some(delta), pct_change, direction)
}

type PairKey = (String, String, NaiveDate, NaiveDate);

/// All adjacent-pair comparisons of one table, with O(1) lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonTable {
    results: Vec<ComparisonResult>,
    #[serde(skip)]
    index: HashMap<PairKey, usize>,
}

impl ComparisonTable {
    /// Compare every entity/metric over every adjacent axis pair.
    ///
    /// A pair is included when the entity has a record at either date.
    pub fn build(table: &EntityTable, polarities: &PolarityTable) -> Self {
        let mut results = Vec::new();
        let axis = table.axis();

        for entity in table.entities() {
            for metric in table.metrics() {
                let polarity = polarities.get(metric);
                for (newer, older) in axis.adjacent_pairs() {
                    let newer_record = table.record(&entity.id, metric, &PeriodKey::Dated(newer.date));
                    let older_record = table.record(&entity.id, metric, &PeriodKey::Dated(older.date));
                    if newer_record.is_none() && older_record.is_none() {
                        continue;
                    }

                    let value_newer = newer_record.and_then(|r| r.value);
                    let value_older = older_record.and_then(|r| r.value);
                    let (delta, pct_change, direction) = compare_pair(value_newer, value_older, polarity);

                    results.push(ComparisonResult {
                        entity_id: entity.id.clone(),
                        metric_name: metric.clone(),
                        date_newer: newer.date,
                        date_older: older.date,
                        value_newer,
                        value_older,
                        delta,
                        pct_change,
                        direction,
                    });
                }
            }
        }

        let index = results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                (
                    (r.entity_id.clone(), r.metric_name.clone(), r.date_newer, r.date_older),
                    i,
                )
            })
            .collect();

        debug!(
            pairs = axis.len().saturating_sub(1),
            results = results.len(),
            "built comparison table"
        );
        Self { results, index }
    }

    pub fn lookup(
        &self,
        entity: &str,
        metric: &str,
        newer: NaiveDate,
        older: NaiveDate,
    ) -> Option<&ComparisonResult> {
        let key = (entity.to_string(), metric.to_string(), newer, older);
        self.index.get(&key).map(|&i| &self.results[i])
    }

    /// Comparison of the two most recent axis dates
    pub fn latest(&self, table: &EntityTable, entity: &str, metric: &str) -> Option<&ComparisonResult> {
        let (newer, older) = table.axis().adjacent_pairs().next()?;
        self.lookup(entity, metric, newer.date, older.date)
    }

    pub fn results(&self) -> &[ComparisonResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::{normalize, RawSheet, SheetConfig};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table(rows: &[Vec<&str>]) -> EntityTable {
        let sheet = RawSheet::from_text_rows(rows);
        let config = SheetConfig::default().with_metrics(["Pending", "Balance"]);
        normalize(&sheet, &config, None).unwrap()
    }

    fn polarities() -> PolarityTable {
        [("Pending", Polarity::LowerIsBetter)].into_iter().collect()
    }

    // -------------------------------------------------------------------------
    // PAIR TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_lower_is_better_decrease_is_improved() {
        let (delta, pct, direction) = compare_pair(Some(80.0), Some(100.0), Some(Polarity::LowerIsBetter));
        assert_eq!(delta, Some(-20.0));
        assert_eq!(pct, Some(-20.0));
        assert_eq!(direction, Direction::Improved);
    }

    #[test]
    fn test_null_value_is_unknown_without_delta() {
        let (delta, pct, direction) = compare_pair(None, Some(100.0), Some(Polarity::LowerIsBetter));
        assert_eq!((delta, pct, direction), (None, None, Direction::Unknown));
    }

    #[test]
    fn test_zero_older_has_no_pct_change() {
        let (delta, pct, direction) = compare_pair(Some(5.0), Some(0.0), Some(Polarity::HigherIsBetter));
        assert_eq!(delta, Some(5.0));
        assert_eq!(pct, None);
        assert_eq!(direction, Direction::Improved);
    }

    #[test]
    fn test_missing_polarity_is_unknown_but_keeps_delta() {
        let (delta, _, direction) = compare_pair(Some(5.0), Some(4.0), None);
        assert_eq!(delta, Some(1.0));
        assert_eq!(direction, Direction::Unknown);
    }

    // -------------------------------------------------------------------------
    // TABLE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_table_covers_adjacent_pairs() {
        let table = table(&[
            vec!["Branch Name", "Pending_20-Oct-24", "Pending_27-Oct-24", "Pending_03-Nov-24"],
            vec!["Kota", "120", "100", "80"],
        ]);
        let comparisons = ComparisonTable::build(&table, &polarities());
        assert_eq!(comparisons.len(), 2);

        let latest = comparisons
            .lookup("kota", "Pending", date(2024, 11, 3), date(2024, 10, 27))
            .unwrap();
        assert_eq!(latest.delta, Some(-20.0));
        assert_eq!(latest.direction, Direction::Improved);
        assert_eq!(comparisons.latest(&table, "kota", "Pending"), Some(latest));

        // non-adjacent dates are never compared
        assert!(comparisons
            .lookup("kota", "Pending", date(2024, 11, 3), date(2024, 10, 20))
            .is_none());
    }

    #[test]
    fn test_placeholder_value_is_unknown() {
        let table = table(&[
            vec!["Branch Name", "Pending_27-Oct-24", "Pending_03-Nov-24"],
            vec!["Kota", "100", "-"],
        ]);
        let comparisons = ComparisonTable::build(&table, &polarities());
        let result = comparisons.latest(&table, "kota", "Pending").unwrap();
        assert_eq!(result.value_newer, None);
        assert_eq!(result.value_older, Some(100.0));
        assert_eq!(result.delta, None);
        assert_eq!(result.direction, Direction::Unknown);
    }

    #[test]
    fn test_unconfigured_metric_is_unknown() {
        let table = table(&[
            vec!["Branch Name", "Balance_27-Oct-24", "Balance_03-Nov-24"],
            vec!["Kota", "100", "150"],
        ]);
        let comparisons = ComparisonTable::build(&table, &polarities());
        let result = comparisons.latest(&table, "kota", "Balance").unwrap();
        assert_eq!(result.delta, Some(50.0));
        assert_eq!(result.direction, Direction::Unknown);
    }

    #[test]
    fn test_entity_without_records_has_no_results() {
        let table = table(&[
            vec!["Branch Name", "Pending_27-Oct-24", "Pending_03-Nov-24", "Balance_03-Nov-24"],
            vec!["Kota", "100", "90", ""],
        ]);
        let comparisons = ComparisonTable::build(&table, &polarities());
        assert!(comparisons.latest(&table, "kota", "Balance").is_none());
        assert_eq!(comparisons.len(), 1);
    }
}
