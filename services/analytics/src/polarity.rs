//! Per-metric polarity: whether a rise or a fall is good news.
//!
//! Polarity is configured, never inferred from data.

use std::collections::BTreeMap;

use parser::config::normalize_label;
use serde::{Deserialize, Serialize};

use crate::compare::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    LowerIsBetter,
    HigherIsBetter,
}

impl Polarity {
    /// Direction of a non-null delta (newer - older)
    pub fn classify(self, delta: f64) -> Direction {
        if delta == 0.0 {
            return Direction::Unchanged;
        }
        let decreased = delta < 0.0;
        match (self, decreased) {
            (Polarity::LowerIsBetter, true) | (Polarity::HigherIsBetter, false) => Direction::Improved,
            _ => Direction::Worsened,
        }
    }
}

/// Metric name -> polarity, matched case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolarityTable(BTreeMap<String, Polarity>);

impl PolarityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric: impl Into<String>, polarity: Polarity) {
        self.0.insert(metric.into(), polarity);
    }

    pub fn get(&self, metric: &str) -> Option<Polarity> {
        if let Some(p) = self.0.get(metric) {
            return Some(*p);
        }
        let wanted = normalize_label(metric);
        self.0
            .iter()
            .find(|(name, _)| normalize_label(name) == wanted)
            .map(|(_, p)| *p)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Polarity)> for PolarityTable {
    fn from_iter<I: IntoIterator<Item = (S, Polarity)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
