//! Entity table builder
//!
//! Extraction pass over a resolved schema. Produces the canonical, sparse
//! (entity, metric, period) fact table for one ingestion cycle.
//!
//! CRITICAL: this stage must be DETERMINISTIC.
//! Same sheet + same config = same table, record for record.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SheetConfig;
use crate::dates::{column_periods, parse_date_cell, DateAxis, PeriodKey};
use crate::error::{Diagnostic, Error, Result};
use crate::numeric::{coerce, Coercion, CoercionStats};
use crate::schema::{CanonicalColumn, ColumnRole, ResolvedSchema};
use crate::sheet::{Cell, RawSheet};

/// One (entity, metric, period) fact. `value` is null for placeholders and
/// unparseable text; an absent source cell produces no record at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub entity_id: String,
    pub metric_name: String,
    pub date_key: PeriodKey,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Normalized identity
    pub id: String,
    /// Display name from the last row seen
    pub name: String,
    /// Text of Unknown-role columns (label, value), from the last row seen
    pub attributes: Vec<(String, String)>,
}

impl Entity {
    pub fn attribute(&self, label: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
    }
}

/// Normalize an identity value (deterministic: lowercase, trim, replace spaces).
///
/// Punctuation other than `.` is kept: "A-1" and "A1" are different entities.
pub fn entity_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
        .replace('.', "")
}

type RecordKey = (String, String, PeriodKey);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityTable {
    columns: Vec<CanonicalColumn>,
    entities: Vec<Entity>,
    metrics: Vec<String>,
    axis: DateAxis,
    records: Vec<MetricRecord>,
    diagnostics: Vec<Diagnostic>,
    coercion: CoercionStats,
    #[serde(skip)]
    index: HashMap<RecordKey, usize>,
    #[serde(skip)]
    entity_index: HashMap<String, usize>,
}

impl EntityTable {
    pub fn columns(&self) -> &[CanonicalColumn] {
        &self.columns
    }

    /// Entities in first-appearance order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entity_index.get(id).map(|&i| &self.entities[i])
    }

    pub fn entity_position(&self, id: &str) -> Option<usize> {
        self.entity_index.get(id).copied()
    }

    /// Metric names in column order
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn axis(&self) -> &DateAxis {
        &self.axis
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn coercion_stats(&self) -> CoercionStats {
        self.coercion
    }

    pub fn record(&self, entity: &str, metric: &str, period: &PeriodKey) -> Option<&MetricRecord> {
        let key = (entity.to_string(), metric.to_string(), period.clone());
        self.index.get(&key).map(|&i| &self.records[i])
    }

    /// Value of a present, non-null record
    pub fn value(&self, entity: &str, metric: &str, period: &PeriodKey) -> Option<f64> {
        self.record(entity, metric, period).and_then(|r| r.value)
    }

    /// Value at a dated axis position
    pub fn value_at(&self, entity: &str, metric: &str, date: NaiveDate) -> Option<f64> {
        self.value(entity, metric, &PeriodKey::Dated(date))
    }

    /// All records of one entity/metric, in period order
    pub fn records_for<'a>(
        &'a self,
        entity: &'a str,
        metric: &'a str,
    ) -> impl Iterator<Item = &'a MetricRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.entity_id == entity && r.metric_name == metric)
    }

    /// All records of one metric at one period, in entity order
    pub fn records_at<'a>(
        &'a self,
        metric: &'a str,
        period: &'a PeriodKey,
    ) -> impl Iterator<Item = &'a MetricRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.metric_name == metric && &r.date_key == period)
    }
}

/// Row slot: one surviving source row per (entity, row period)
#[derive(Debug)]
struct Slot {
    entity_id: String,
    row: usize,
    period: Option<PeriodKey>,
}

/// Build the entity table from a resolved schema.
///
/// `as_of` dates metric columns that carry no period token in a sheet with no
/// date column; without it such values are `Undated`.
pub fn build(
    sheet: &RawSheet,
    schema: &ResolvedSchema,
    config: &SheetConfig,
    as_of: Option<NaiveDate>,
) -> Result<EntityTable> {
    let identity_idx = schema.identity_index().ok_or_else(|| Error::SchemaMismatch {
        labels: schema.labels(),
    })?;
    let date_idx = schema.date_index();
    let columns = &schema.columns;
    let formats = &config.date_formats;

    let mut diagnostics = schema.diagnostics.clone();
    let periods = column_periods(columns, formats, &mut diagnostics);

    let mut metrics: Vec<String> = Vec::new();
    for column in columns {
        if let ColumnRole::Metric { metric, .. } = &column.role {
            if !metrics.contains(metric) {
                metrics.push(metric.clone());
            }
        }
    }

    // Axis sources in encounter order: header tokens first, then row dates
    let mut axis_sources: Vec<(PeriodKey, String)> = periods
        .iter()
        .flatten()
        .map(|p| (p.key.clone(), p.token.clone()))
        .collect();

    // -------------------------------------------------------------------------
    // Row pass: identities, duplicates, attributes
    // -------------------------------------------------------------------------

    let mut entities: Vec<Entity> = Vec::new();
    let mut entity_index: HashMap<String, usize> = HashMap::new();
    let mut slots: Vec<Slot> = Vec::new();
    let mut slot_index: HashMap<(String, Option<PeriodKey>), usize> = HashMap::new();

    for row in schema.body_start..sheet.row_count() {
        if sheet.rows()[row].iter().all(Cell::is_blank) {
            continue;
        }

        let name = sheet.cell(row, identity_idx).as_label();
        let id = entity_key(&name);
        if id.is_empty() {
            diagnostics.push(Diagnostic::MissingIdentity { row: row + 1 });
            continue;
        }

        let row_period = date_idx.and_then(|i| {
            let cell = sheet.cell(row, i);
            let period = parse_date_cell(cell, formats)?;
            if let PeriodKey::Label(token) = &period {
                diagnostics.push(Diagnostic::DateParseFailure {
                    column: columns[i].label.clone(),
                    token: token.clone(),
                });
            }
            axis_sources.push((period.clone(), cell.as_label()));
            Some(period)
        });

        let attributes = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role == ColumnRole::Unknown)
            .filter_map(|(i, c)| {
                let cell = sheet.cell(row, i);
                (!cell.is_blank()).then(|| (c.label.clone(), cell.as_label()))
            })
            .collect();

        // Last write wins for display name and attributes; position stays first
        match entity_index.get(&id).copied() {
            Some(i) => {
                entities[i].name = name;
                entities[i].attributes = attributes;
            }
            None => {
                entity_index.insert(id.clone(), entities.len());
                entities.push(Entity {
                    id: id.clone(),
                    name,
                    attributes,
                });
            }
        }

        let slot_key = (id.clone(), row_period.clone());
        match slot_index.get(&slot_key).copied() {
            Some(i) => {
                diagnostics.push(Diagnostic::DuplicateEntity {
                    entity: id,
                    row: row + 1,
                    previous_row: slots[i].row + 1,
                });
                slots[i].row = row;
            }
            None => {
                slot_index.insert(slot_key, slots.len());
                slots.push(Slot {
                    entity_id: id,
                    row,
                    period: row_period,
                });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Emission: one record per present metric cell
    // -------------------------------------------------------------------------

    let mut coercion = CoercionStats::default();
    let mut records: Vec<MetricRecord> = Vec::new();
    let mut index: HashMap<RecordKey, usize> = HashMap::new();
    let mut as_of_used = false;

    for slot in &slots {
        for (col, column) in columns.iter().enumerate() {
            let metric = match &column.role {
                ColumnRole::Metric { metric, .. } => metric,
                _ => continue,
            };

            let cell = sheet.cell(slot.row, col);
            let coerced = coerce(cell, &config.placeholders);
            if coerced == Coercion::Blank {
                continue;
            }
            coercion.record(&coerced);
            if let Coercion::Failed(raw) = &coerced {
                diagnostics.push(Diagnostic::ValueCoercionFailure {
                    row: slot.row + 1,
                    column: column.label.clone(),
                    raw: raw.clone(),
                });
            }
            let value = coerced.value();

            let period = match (&periods[col], &slot.period, as_of) {
                (Some(column_period), _, _) => column_period.key.clone(),
                (None, Some(row_period), _) => row_period.clone(),
                (None, None, Some(date)) => {
                    as_of_used = true;
                    PeriodKey::Dated(date)
                }
                (None, None, None) => PeriodKey::Undated,
            };

            let key = (slot.entity_id.clone(), metric.clone(), period.clone());
            match index.get(&key).copied() {
                Some(i) => {
                    // Same date reached twice: agree -> merge, conflict -> later column wins
                    if records[i].value != value {
                        diagnostics.push(Diagnostic::ConflictingDateKeys {
                            entity: slot.entity_id.clone(),
                            metric: metric.clone(),
                            period: period.to_string(),
                            column: column.label.clone(),
                        });
                        records[i].value = value;
                    }
                }
                None => {
                    index.insert(key, records.len());
                    records.push(MetricRecord {
                        entity_id: slot.entity_id.clone(),
                        metric_name: metric.clone(),
                        date_key: period,
                        value,
                    });
                }
            }
        }
    }

    if let Some(date) = as_of.filter(|_| as_of_used) {
        axis_sources.push((PeriodKey::Dated(date), date.format("%Y-%m-%d").to_string()));
    }
    let axis = DateAxis::from_periods(axis_sources.iter().map(|(k, t)| (k, t.as_str())));

    // Entity order, then metric order, then period order
    let metric_pos: HashMap<&str, usize> = metrics
        .iter()
        .enumerate()
        .map(|(i, m)| (m.as_str(), i))
        .collect();
    records.sort_by(|a, b| {
        entity_index[&a.entity_id]
            .cmp(&entity_index[&b.entity_id])
            .then_with(|| metric_pos[a.metric_name.as_str()].cmp(&metric_pos[b.metric_name.as_str()]))
            .then_with(|| period_rank(&axis, &a.date_key).cmp(&period_rank(&axis, &b.date_key)))
    });
    let index = records
        .iter()
        .enumerate()
        .map(|(i, r)| ((r.entity_id.clone(), r.metric_name.clone(), r.date_key.clone()), i))
        .collect();

    debug!(
        entities = entities.len(),
        metrics = metrics.len(),
        periods = axis.len(),
        records = records.len(),
        "built entity table"
    );
    if !diagnostics.is_empty() {
        warn!(
            count = diagnostics.len(),
            coercion_failures = coercion.failures,
            "sheet normalized with diagnostics"
        );
        for diagnostic in &diagnostics {
            debug!(kind = diagnostic.kind(), "{}", diagnostic);
        }
    }

    Ok(EntityTable {
        columns: columns.clone(),
        entities,
        metrics,
        axis,
        records,
        diagnostics,
        coercion,
        index,
        entity_index,
    })
}

/// Sort rank of a period: axis keys, then non-temporal keys, then undated
fn period_rank(axis: &DateAxis, key: &PeriodKey) -> (u8, usize) {
    match key {
        PeriodKey::Dated(date) => (0, axis.position(*date).unwrap_or(usize::MAX)),
        PeriodKey::Label(label) => (
            1,
            axis.non_temporal()
                .iter()
                .position(|l| l == label)
                .unwrap_or(usize::MAX),
        ),
        PeriodKey::Undated => (2, 0),
    }
}

// =============================================================================
// TESTS - Determinism and sparsity
// =============================================================================
