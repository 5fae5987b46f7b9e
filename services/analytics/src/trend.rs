//! Streak tallies and best/worst ranking
//!
//! Counts are a simple tally over all valid adjacent pairs, not a longest
//! run. A pair with a null or absent value is skipped without resetting
//! anything.

use parser::EntityTable;
use serde::Serialize;

use crate::compare::ComparisonTable;
use crate::polarity::{Polarity, PolarityTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTrend {
    pub entity_id: String,
    pub metric_name: String,
    /// Valid pairs whose value went down
    pub decreasing_count: usize,
    /// Valid pairs whose value went up
    pub increasing_count: usize,
    pub unchanged_count: usize,
    pub polarity: Option<Polarity>,
}

impl EntityTrend {
    /// Movements in the good direction; zero without a polarity
    pub fn improved_count(&self) -> usize {
        match self.polarity {
            Some(Polarity::LowerIsBetter) => self.decreasing_count,
            Some(Polarity::HigherIsBetter) => self.increasing_count,
            None => 0,
        }
    }

    pub fn worsened_count(&self) -> usize {
        match self.polarity {
            Some(Polarity::LowerIsBetter) => self.increasing_count,
            Some(Polarity::HigherIsBetter) => self.decreasing_count,
            None => 0,
        }
    }
}

/// Tally every entity/metric over the full axis, in entity then metric order
pub fn trends(
    table: &EntityTable,
    comparisons: &ComparisonTable,
    polarities: &PolarityTable,
) -> Vec<EntityTrend> {
    let mut out = Vec::new();

    for entity in table.entities() {
        for metric in table.metrics() {
            if table.records_for(&entity.id, metric).next().is_none() {
                continue;
            }

            let mut trend = EntityTrend {
                entity_id: entity.id.clone(),
                metric_name: metric.clone(),
                decreasing_count: 0,
                increasing_count: 0,
                unchanged_count: 0,
                polarity: polarities.get(metric),
            };

            for (newer, older) in table.axis().adjacent_pairs() {
                let delta = comparisons
                    .lookup(&entity.id, metric, newer.date, older.date)
                    .and_then(|r| r.delta);
                match delta {
                    Some(d) if d < 0.0 => trend.decreasing_count += 1,
                    Some(d) if d > 0.0 => trend.increasing_count += 1,
                    Some(_) => trend.unchanged_count += 1,
                    None => {}
                }
            }

            out.push(trend);
        }
    }

    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntity {
    pub entity_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranking {
    pub metric_name: String,
    pub best: RankedEntity,
    /// Absent when the best entity is the only candidate
    pub worst: Option<RankedEntity>,
}

/// Best and worst entity of one metric.
///
/// Best = max improved count, ties to the first entity. Worst = max worsened
/// count over the remaining entities only; the best entity is never a
/// candidate for worst. Metrics without a polarity are not ranked.
pub fn rank(trends: &[EntityTrend], metric: &str) -> Option<Ranking> {
    let candidates: Vec<&EntityTrend> = trends
        .iter()
        .filter(|t| t.metric_name == metric && t.polarity.is_some())
        .collect();

    let best = first_max(candidates.iter().copied(), EntityTrend::improved_count)?;
    let worst = first_max(
        candidates
            .iter()
            .copied()
            .filter(|t| t.entity_id != best.entity_id),
        EntityTrend::worsened_count,
    );

    Some(Ranking {
        metric_name: metric.to_string(),
        best: RankedEntity {
            entity_id: best.entity_id.clone(),
            count: best.improved_count(),
        },
        worst: worst.map(|t| RankedEntity {
            entity_id: t.entity_id.clone(),
            count: t.worsened_count(),
        }),
    })
}

/// Maximum by `count`; the first one wins a tie
fn first_max<'a, I, F>(items: I, count: F) -> Option<&'a EntityTrend>
where
    I: Iterator<Item = &'a EntityTrend>,
    F: Fn(&EntityTrend) -> usize,
{
    let mut best: Option<&EntityTrend> = None;
    for item in items {
        if best.map_or(true, |b| count(item) > count(b)) {
            best = Some(item);
        }
    }
    best
}
