//! Per-sheet report: JSON payload and console rendering

use std::fmt::Write as _;

use analytics::{
    summarize, trends, ComparisonResult, ComparisonTable, DashboardSummary, EntityTrend, Polarity,
};
use chrono::{DateTime, Utc};
use parser::{Diagnostic, MetricRecord, Snapshot};
use serde::Serialize;

use crate::config::DashboardConfig;

#[derive(Debug, Clone, Serialize)]
pub struct SheetReport {
    pub source: String,
    pub snapshot_id: String,
    pub content_hash: String,
    pub built_at: DateTime<Utc>,
    pub summary: DashboardSummary,
    pub diagnostics: Vec<Diagnostic>,
    pub records: Vec<MetricRecord>,
    pub comparisons: Vec<ComparisonResult>,
    pub trends: Vec<EntityTrend>,
}

impl SheetReport {
    pub fn build(snapshot: &Snapshot, config: &DashboardConfig, top_k: usize) -> Self {
        let table = snapshot.table.as_ref();
        let comparisons = ComparisonTable::build(table, &config.metrics);
        let trends = trends(table, &comparisons, &config.metrics);

        Self {
            source: snapshot.source.clone(),
            snapshot_id: snapshot.snapshot_id.to_string(),
            content_hash: snapshot.content_hash.clone(),
            built_at: snapshot.built_at,
            summary: summarize(table, &config.metrics, &trends, &config.ratios, top_k),
            diagnostics: table.diagnostics().to_vec(),
            records: table.records().to_vec(),
            comparisons: comparisons.results().to_vec(),
            trends,
        }
    }
}

/// Console rendering of one report
pub fn render_text(report: &SheetReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    let _ = writeln!(out, "\n[{}]", report.source);
    let _ = writeln!(out, "  Snapshot: {}", report.snapshot_id);
    let _ = writeln!(out, "  Hash: {}", report.content_hash);
    let period = match (&summary.latest, &summary.previous) {
        (Some(latest), Some(previous)) => format!("{} vs {}", latest.label, previous.label),
        (Some(latest), None) => latest.label.clone(),
        _ => "(undated)".to_string(),
    };
    let _ = writeln!(
        out,
        "  Entities: {}  Records: {}  Period: {}",
        summary.entity_count, summary.record_count, period
    );

    for metric in &summary.metrics {
        let _ = writeln!(out, "\n  {} ({})", metric.metric_name, polarity_label(metric.polarity));
        let _ = write!(out, "    Total: {}", format_amount(metric.latest_total));
        if let Some(previous) = metric.previous_total {
            let _ = write!(
                out,
                "  Previous: {}  Change: {}",
                format_amount(previous),
                format_pct(metric.change_pct)
            );
        }
        let _ = writeln!(out);

        if !metric.top.is_empty() {
            let top: Vec<String> = metric
                .top
                .iter()
                .map(|t| format!("{} {}", t.name, format_amount(t.value)))
                .collect();
            let _ = writeln!(out, "    Top: {}", top.join(", "));
        }

        if let Some(ranking) = &metric.ranking {
            let _ = write!(
                out,
                "    Best: {} ({})",
                ranking.best.entity_id, ranking.best.count
            );
            if let Some(worst) = &ranking.worst {
                let _ = write!(out, "  Worst: {} ({})", worst.entity_id, worst.count);
            }
            let _ = writeln!(out);
        }
    }

    if !summary.ratios.is_empty() {
        let _ = writeln!(out, "\n  Ratios:");
        for ratio in &summary.ratios {
            let _ = writeln!(out, "    {}: {:.1}%", ratio.name, ratio.value);
        }
    }

    if !report.diagnostics.is_empty() {
        let _ = writeln!(
            out,
            "\n  ⚠ Diagnostics: {} (coercion failures: {})",
            report.diagnostics.len(),
            summary.coercion_failures
        );
        for diagnostic in &report.diagnostics {
            let _ = writeln!(out, "    - {}", diagnostic);
        }
    }

    out
}

fn polarity_label(polarity: Option<Polarity>) -> &'static str {
    match polarity {
        Some(Polarity::LowerIsBetter) => "lower is better",
        Some(Polarity::HigherIsBetter) => "higher is better",
        None => "no polarity",
    }
}

/// Format an amount with thousands separators and two decimals
pub fn format_amount(amount: f64) -> String {
    let formatted = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Signed percentage, or "n/a"
pub fn format_pct(pct: Option<f64>) -> String {
    match pct {
        Some(p) => format!("{:+.1}%", p),
        None => "n/a".to_string(),
    }
}
