//! Dashboard summary of one entity table
//!
//! Latest period = first axis key, previous = second. A table with no dated
//! axis is summarized at its undated period.

use parser::{AxisKey, EntityTable, PeriodKey};
use serde::Serialize;
use tracing::debug;

use crate::aggregate::{change_pct, Order, RatioConfig, Slice};
use crate::polarity::{Polarity, PolarityTable};
use crate::trend::{rank, EntityTrend, Ranking};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopEntry {
    pub entity_id: String,
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub metric_name: String,
    pub polarity: Option<Polarity>,
    pub latest_total: f64,
    pub previous_total: Option<f64>,
    pub change_pct: Option<f64>,
    pub top: Vec<TopEntry>,
    pub ranking: Option<Ranking>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioValue {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub latest: Option<AxisKey>,
    pub previous: Option<AxisKey>,
    pub entity_count: usize,
    pub record_count: usize,
    pub metrics: Vec<MetricSummary>,
    pub ratios: Vec<RatioValue>,
    pub diagnostic_count: usize,
    pub coercion_failures: usize,
}

/// Build the dashboard summary: totals, change, top-k, rankings and ratios.
///
/// `trends` are the table's entity trends; rankings are read from them.
pub fn summarize(
    table: &EntityTable,
    polarities: &PolarityTable,
    trends: &[EntityTrend],
    ratios: &[RatioConfig],
    top_k: usize,
) -> DashboardSummary {
    let axis = table.axis();
    let latest_period = axis
        .latest()
        .map_or(PeriodKey::Undated, |k| PeriodKey::Dated(k.date));
    let latest = Slice::new(table, latest_period);
    let previous = axis.previous().map(|k| Slice::new(table, PeriodKey::Dated(k.date)));

    let metrics = table
        .metrics()
        .iter()
        .map(|metric| {
            let polarity = polarities.get(metric);
            let latest_total = latest.sum(metric);
            let previous_total = previous.as_ref().map(|s| s.sum(metric));
            let order = match polarity {
                Some(Polarity::LowerIsBetter) => Order::Smallest,
                _ => Order::Largest,
            };
            let top = latest
                .top_k(metric, top_k, order)
                .into_iter()
                .map(|(id, value)| TopEntry {
                    entity_id: id.to_string(),
                    name: table.entity(id).map_or_else(|| id.to_string(), |e| e.name.clone()),
                    value,
                })
                .collect();

            MetricSummary {
                metric_name: metric.clone(),
                polarity,
                latest_total,
                previous_total,
                change_pct: previous_total.and_then(|p| change_pct(latest_total, p)),
                top,
                ranking: rank(trends, metric),
            }
        })
        .collect();

    let ratios = ratios
        .iter()
        .map(|ratio| RatioValue {
            name: ratio.name.clone(),
            value: ratio.evaluate(&latest),
        })
        .collect();

    let summary = DashboardSummary {
        latest: axis.latest().cloned(),
        previous: axis.previous().cloned(),
        entity_count: table.entities().len(),
        record_count: table.records().len(),
        metrics,
        ratios,
        diagnostic_count: table.diagnostics().len(),
        coercion_failures: table.coercion_stats().failures,
    };
    debug!(
        metrics = summary.metrics.len(),
        ratios = summary.ratios.len(),
        "summarized table"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::ComparisonTable;
    use crate::trend::trends;
    use parser::{normalize, RawSheet, SheetConfig};

    fn table() -> EntityTable {
        let sheet = RawSheet::from_text_rows(&[
            vec!["Branch Name", "Balance_27-Oct-24", "Balance_03-Nov-24", "Pending_27-Oct-24", "Pending_03-Nov-24"],
            vec!["Kota", "100", "120", "30", "20"],
            vec!["Ajmer", "80", "60", "10", "15"],
            vec!["Bundi", "50", "50", "5", "-"],
        ]);
        let config = SheetConfig::default().with_metrics(["Balance", "Pending"]);
        normalize(&sheet, &config, None).unwrap()
    }

    fn polarities() -> PolarityTable {
        [
            ("Balance", Polarity::HigherIsBetter),
            ("Pending", Polarity::LowerIsBetter),
        ]
        .into_iter()
        .collect()
    }

    fn summary_of(
        table: &EntityTable,
        polarities: &PolarityTable,
        ratios: &[RatioConfig],
        top_k: usize,
    ) -> DashboardSummary {
        let comparisons = ComparisonTable::build(table, polarities);
        let trends = trends(table, &comparisons, polarities);
        summarize(table, polarities, &trends, ratios, top_k)
    }

    fn share() -> RatioConfig {
        RatioConfig {
            name: "Balance Share".into(),
            numerator: "Balance".into(),
            denominator: vec!["Balance".into(), "Pending".into()],
        }
    }

    #[test]
    fn test_totals_and_change() {
        let summary = summary_of(&table(), &polarities(), &[], 3);
        assert_eq!(summary.latest.as_ref().unwrap().label, "03-Nov-24");
        assert_eq!(summary.previous.as_ref().unwrap().label, "27-Oct-24");

        let balance = &summary.metrics[0];
        assert_eq!(balance.latest_total, 230.0);
        assert_eq!(balance.previous_total, Some(230.0));
        assert_eq!(balance.change_pct, Some(0.0));

        let pending = &summary.metrics[1];
        assert_eq!(pending.latest_total, 35.0);
        assert_eq!(pending.previous_total, Some(45.0));
    }

    #[test]
    fn test_top_follows_polarity() {
        let summary = summary_of(&table(), &polarities(), &[], 2);
        let balance: Vec<_> = summary.metrics[0].top.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(balance, vec!["Kota", "Ajmer"]);
        let pending: Vec<_> = summary.metrics[1].top.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(pending, vec!["Ajmer", "Kota"]);
    }

    #[test]
    fn test_rankings() {
        let summary = summary_of(&table(), &polarities(), &[], 3);
        let pending = summary.metrics[1].ranking.as_ref().unwrap();
        // kota 30 -> 20 improved; ajmer 10 -> 15 worsened; bundi null
        assert_eq!(pending.best.entity_id, "kota");
        assert_eq!(pending.worst.as_ref().unwrap().entity_id, "ajmer");

        let balance = summary.metrics[0].ranking.as_ref().unwrap();
        assert_eq!(balance.best.entity_id, "kota");
        assert_eq!(balance.worst.as_ref().unwrap().entity_id, "ajmer");
    }

    #[test]
    fn test_ratios_on_latest_period() {
        let summary = summary_of(&table(), &polarities(), &[share()], 3);
        assert_eq!(summary.ratios[0].value, 230.0 / 265.0 * 100.0);
    }

    #[test]
    fn test_unconfigured_metrics_not_ranked() {
        let summary = summary_of(&table(), &PolarityTable::new(), &[], 3);
        assert!(summary.metrics.iter().all(|m| m.ranking.is_none()));
    }

    #[test]
    fn test_rankings_come_from_given_trends() {
        let summary = summarize(&table(), &polarities(), &[], &[], 3);
        assert!(summary.metrics.iter().all(|m| m.ranking.is_none()));
        assert_eq!(summary.metrics[0].latest_total, 230.0);
    }

    #[test]
    fn test_undated_table_summarized() {
        let sheet = RawSheet::from_text_rows(&[vec!["Branch Name", "Balance"], vec!["Kota", "10"]]);
        let config = SheetConfig::default().with_metrics(["Balance"]);
        let table = normalize(&sheet, &config, None).unwrap();
        let summary = summary_of(&table, &polarities(), &[share()], 3);
        assert!(summary.latest.is_none());
        assert_eq!(summary.metrics[0].latest_total, 10.0);
        assert_eq!(summary.metrics[0].previous_total, None);
        assert_eq!(summary.ratios[0].value, 100.0);
    }
}
