//! Numeric coercion of raw cells
//!
//! Text that is neither a placeholder nor a number becomes null, never 0.
//! Summaries downstream use null-aware sums, so the distinction matters.

use serde::Serialize;

use crate::sheet::Cell;

/// Outcome of coercing one cell
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    Value(f64),
    /// Explicit "no value" marker such as "-" or "None"
    Placeholder,
    /// Nothing in the source cell
    Blank,
    /// Free text (or a non-numeric cell) that could not be parsed
    Failed(String),
}

impl Coercion {
    pub fn value(&self) -> Option<f64> {
        match self {
            Coercion::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// Diagnostic counters for one normalization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoercionStats {
    pub values: usize,
    pub nulls: usize,
    pub failures: usize,
}

impl CoercionStats {
    pub fn record(&mut self, coercion: &Coercion) {
        match coercion {
            Coercion::Value(_) => self.values += 1,
            Coercion::Placeholder => self.nulls += 1,
            Coercion::Failed(_) => {
                self.nulls += 1;
                self.failures += 1;
            }
            Coercion::Blank => {}
        }
    }
}

/// Coerce one cell into a number
pub fn coerce(cell: &Cell, placeholders: &[String]) -> Coercion {
    match cell {
        Cell::Blank => Coercion::Blank,
        Cell::Number(n) if n.is_finite() => Coercion::Value(*n),
        Cell::Number(n) => Coercion::Failed(n.to_string()),
        Cell::Date(d) => Coercion::Failed(d.format("%Y-%m-%d").to_string()),
        Cell::Text(raw) => coerce_text(raw, placeholders),
    }
}

fn coerce_text(raw: &str, placeholders: &[String]) -> Coercion {
    let trimmed = raw.trim();
    if placeholders.iter().any(|p| p.trim() == trimmed) {
        return Coercion::Placeholder;
    }

    // Strip thousands separators ("1,234.50" -> "1234.50")
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Coercion::Value(v),
        _ => Coercion::Failed(raw.to_string()),
    }
}

/// Coerce a cell to a nullable number, counting failures in `stats`
pub fn normalize_cell(cell: &Cell, placeholders: &[String], stats: &mut CoercionStats) -> Option<f64> {
    let coercion = coerce(cell, placeholders);
    stats.record(&coercion);
    coercion.value()
}
