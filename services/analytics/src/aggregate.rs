//! Aggregate metrics over one period and an entity subset
//!
//! Nulls are skipped everywhere, and nothing here returns NaN.

use std::collections::HashMap;

use parser::{EntityTable, PeriodKey};
use serde::{Deserialize, Serialize};

/// Records of one table at one period, optionally restricted to some entities
#[derive(Debug, Clone)]
pub struct Slice<'a> {
    table: &'a EntityTable,
    period: PeriodKey,
    entities: Option<Vec<String>>,
}

impl<'a> Slice<'a> {
    pub fn new(table: &'a EntityTable, period: PeriodKey) -> Self {
        Self {
            table,
            period,
            entities: None,
        }
    }

    /// Restrict to the given entity ids
    pub fn with_entities<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn period(&self) -> &PeriodKey {
        &self.period
    }

    pub fn table(&self) -> &'a EntityTable {
        self.table
    }

    fn contains(&self, entity: &str) -> bool {
        self.entities
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == entity))
    }

    /// Non-null values of `metric`, in source entity order
    pub fn values(&self, metric: &str) -> Vec<(&'a str, f64)> {
        let table = self.table;
        table
            .records()
            .iter()
            .filter(|r| r.metric_name == metric && r.date_key == self.period)
            .filter(|r| self.contains(&r.entity_id))
            .filter_map(|r| r.value.map(|v| (r.entity_id.as_str(), v)))
            .collect()
    }

    /// Null-aware sum
    pub fn sum(&self, metric: &str) -> f64 {
        self.values(metric).iter().map(|(_, v)| v).sum()
    }

    /// Sum of `metric` per distinct value of an entity attribute (pivot).
    ///
    /// Groups keep first-seen order; entities without the attribute are left out.
    pub fn group_sum(&self, metric: &str, attribute: &str) -> Vec<(String, f64)> {
        let mut groups: Vec<(String, f64)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (entity_id, value) in self.values(metric) {
            let group = match self.table.entity(entity_id).and_then(|e| e.attribute(attribute)) {
                Some(g) => g.to_string(),
                None => continue,
            };
            match positions.get(&group).copied() {
                Some(i) => groups[i].1 += value,
                None => {
                    positions.insert(group.clone(), groups.len());
                    groups.push((group, value));
                }
            }
        }

        groups
    }

    /// Stable top-k selection; ties keep source entity order
    pub fn top_k(&self, metric: &str, k: usize, order: Order) -> Vec<(&'a str, f64)> {
        let mut values = self.values(metric);
        // sort_by is stable
        values.sort_by(|a, b| match order {
            Order::Largest => b.1.total_cmp(&a.1),
            Order::Smallest => a.1.total_cmp(&b.1),
        });
        values.truncate(k);
        values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// `nlargest` analogue
    Largest,
    /// `nsmallest` analogue
    Smallest,
}

/// `numerator / denominator * 100`, or 0 when the denominator is 0
pub fn ratio_pct(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let pct = numerator / denominator * 100.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}

/// Share of `part` in `part + rest`, e.g. balance / (balance + pending) * 100
pub fn share_pct(part: f64, rest: f64) -> f64 {
    ratio_pct(part, part + rest)
}

/// Period-over-period change in percent; `None` when the previous total is 0
pub fn change_pct(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0)
}

/// Configured ratio: sum(numerator) / sum(denominator metrics) * 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioConfig {
    pub name: String,
    pub numerator: String,
    pub denominator: Vec<String>,
}

impl RatioConfig {
    pub fn evaluate(&self, slice: &Slice<'_>) -> f64 {
        let numerator = slice.sum(&self.numerator);
        let denominator: f64 = self.denominator.iter().map(|m| slice.sum(m)).sum();
        ratio_pct(numerator, denominator)
    }
}
