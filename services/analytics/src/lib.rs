//! Analytics - Period comparison, trends and aggregates over entity tables
//!
//! All results are pure functions of an `EntityTable` snapshot plus the
//! per-metric polarity table. Nothing is mutated in place.

pub mod aggregate;
pub mod compare;
pub mod polarity;
pub mod summary;
pub mod trend;

pub use aggregate::{change_pct, ratio_pct, share_pct, Order, RatioConfig, Slice};
pub use compare::{compare_pair, ComparisonResult, ComparisonTable, Direction};
pub use polarity::{Polarity, PolarityTable};
pub use summary::{summarize, DashboardSummary, MetricSummary, RatioValue, TopEntry};
pub use trend::{rank, trends, EntityTrend, RankedEntity, Ranking};
