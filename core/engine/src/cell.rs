//! FILENAME: core/engine/src/cell.rs
//! PURPOSE: Defines the value held by a single cell of a source table.
//! CONTEXT: `CellValue` is the unit every column reads, coerces and formats.
//! It is hashable so that typed values can key group and pivot maps directly.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Represents the possible errors a cell can hold (e.g., #DIV/0!)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellError {
    Div0,  // Division by zero
    Ref,   // Invalid reference
    Name,  // Unknown name
    Value, // Wrong type of value
    NA,    // Value not available
}

impl CellError {
    pub fn label(&self) -> &'static str {
        match self {
            CellError::Div0 => "#DIV/0!",
            CellError::Ref => "#REF!",
            CellError::Name => "#NAME?",
            CellError::Value => "#VALUE!",
            CellError::NA => "#N/A",
        }
    }
}

/// Represents the raw or typed data within a cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Integer(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    Error(CellError),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the value, used by binning and numeric aggregators.
    /// Dates map to their day number so they bin like integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Date(d) => Some(d.num_days_from_ce() as f64),
            _ => None,
        }
    }

    /// Returns the display value of the cell as a String, without any
    /// column-specific format applied.
    pub fn display_value(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Number(n) => {
                // Format without unnecessary decimal places
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.0}", n)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => {
                if *b { "TRUE" } else { "FALSE" }.to_string()
            }
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Error(e) => e.label().to_string(),
        }
    }

    /// Total ordering across variants: empty first, then numbers (integers and
    /// floats compare by value), text, booleans, dates, errors.
    pub fn total_cmp(&self, other: &CellValue) -> Ordering {
        fn rank(v: &CellValue) -> u8 {
            match v {
                CellValue::Empty => 0,
                CellValue::Integer(_) | CellValue::Number(_) => 1,
                CellValue::Text(_) => 2,
                CellValue::Boolean(_) => 3,
                CellValue::Date(_) => 4,
                CellValue::Error(_) => 5,
            }
        }

        match (self, other) {
            (CellValue::Integer(a), CellValue::Integer(b)) => a.cmp(b),
            (CellValue::Integer(_) | CellValue::Number(_), CellValue::Integer(_) | CellValue::Number(_)) => {
                let a = self.as_f64().unwrap_or(f64::NAN);
                let b = other.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
            (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
            (CellValue::Error(a), CellValue::Error(b)) => a.label().cmp(b.label()),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

/// Inverse of the day-number view of dates used by `CellValue::as_f64`.
pub fn date_from_days(days: f64) -> Option<NaiveDate> {
    if !days.is_finite() {
        return None;
    }
    NaiveDate::from_num_days_from_ce_opt(days.floor() as i32)
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

/// NaN values are treated as equal to each other so that every value can be
/// used as a map key.
impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => true,
            (CellValue::Integer(a), CellValue::Integer(b)) => a == b,
            (CellValue::Number(a), CellValue::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits() || a == b
            }
            (CellValue::Text(a), CellValue::Text(b)) => a == b,
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a == b,
            (CellValue::Date(a), CellValue::Date(b)) => a == b,
            (CellValue::Error(a), CellValue::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Empty => {}
            CellValue::Integer(i) => i.hash(state),
            CellValue::Number(n) => {
                if n.is_nan() {
                    // All NaN values hash to the same thing
                    u64::MAX.hash(state);
                } else if *n == 0.0 {
                    // -0.0 == 0.0
                    0u64.hash(state);
                } else {
                    n.to_bits().hash(state);
                }
            }
            CellValue::Text(s) => s.hash(state),
            CellValue::Boolean(b) => b.hash(state),
            CellValue::Date(d) => d.hash(state),
            CellValue::Error(e) => e.hash(state),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}
