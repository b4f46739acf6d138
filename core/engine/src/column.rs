//! FILENAME: core/engine/src/column.rs
//! PURPOSE: Column metadata and the typed/formatted views of a cell.
//! CONTEXT: A `Column` knows where its value lives in a row, what type the
//! value should be coerced to, and how to format it. Per-cell failures are
//! returned as `ValueFault`, never raised, so callers can route them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::{date_from_days, CellValue};
use crate::number_format::{format_date, format_number, NumberFormat};
use crate::sheet::Row;

/// Index of a column within its sheet.
pub type ColumnId = usize;

/// Type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColumnType {
    #[default]
    Any,
    Text,
    Integer,
    Float,
    Date,
    Boolean,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float | ColumnType::Date)
    }

    /// Integral domains cannot hold more distinct values than their range.
    pub fn is_integral(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Date)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Any => "any",
            ColumnType::Text => "text",
            ColumnType::Integer => "int",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::Boolean => "bool",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell that could not be coerced or formatted.
/// Hashable so it can key the error group it is routed to.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueFault {
    #[error("cannot convert {value:?} to {target}")]
    Coercion { value: String, target: ColumnType },

    #[error("source cell holds {0}")]
    Source(String),

    #[error("cannot format {value:?}: {reason}")]
    Format { value: String, reason: String },
}

/// Describes one column of a source table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Display name (defaults to column header from source).
    pub name: String,

    /// Position of this column's value within each row.
    pub index: usize,

    #[serde(default)]
    pub col_type: ColumnType,

    /// Display width in characters, if configured.
    #[serde(default)]
    pub width: Option<usize>,

    #[serde(default)]
    pub format: NumberFormat,

    /// Names of aggregators the user marked this column with.
    #[serde(default)]
    pub aggregators: Vec<String>,

    #[serde(default)]
    pub hidden: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, index: usize, col_type: ColumnType) -> Self {
        Column {
            name: name.into(),
            index,
            col_type,
            width: None,
            format: NumberFormat::General,
            aggregators: Vec::new(),
            hidden: false,
        }
    }

    pub fn with_format(mut self, format: NumberFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_aggregators(mut self, names: &[&str]) -> Self {
        self.aggregators = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// The raw stored value for this column in `row`.
    pub fn get_value<'r>(&self, row: &'r Row) -> &'r CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        row.get(self.index).unwrap_or(&EMPTY)
    }

    /// The stored value coerced to this column's type.
    pub fn typed_value(&self, row: &Row) -> Result<CellValue, ValueFault> {
        self.coerce(self.get_value(row))
    }

    /// Coerces an arbitrary value to this column's type. Empty stays empty.
    pub fn coerce(&self, value: &CellValue) -> Result<CellValue, ValueFault> {
        if let CellValue::Error(e) = value {
            return Err(ValueFault::Source(e.label().to_string()));
        }
        if value.is_empty() {
            return Ok(CellValue::Empty);
        }

        let coerced = match (self.col_type, value) {
            (ColumnType::Any, v) => Some(v.clone()),

            (ColumnType::Text, CellValue::Text(s)) => Some(CellValue::Text(s.clone())),
            (ColumnType::Text, v) => Some(CellValue::Text(v.display_value())),

            (ColumnType::Integer, CellValue::Integer(i)) => Some(CellValue::Integer(*i)),
            (ColumnType::Integer, CellValue::Number(n)) if n.is_finite() => {
                Some(CellValue::Integer(n.trunc() as i64))
            }
            (ColumnType::Integer, CellValue::Boolean(b)) => Some(CellValue::Integer(*b as i64)),
            (ColumnType::Integer, CellValue::Text(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| {
                        s.parse::<f64>()
                            .ok()
                            .filter(|n| n.is_finite())
                            .map(|n| n.trunc() as i64)
                    })
                    .map(CellValue::Integer)
            }

            (ColumnType::Float, CellValue::Number(n)) => Some(CellValue::Number(*n)),
            (ColumnType::Float, CellValue::Integer(i)) => Some(CellValue::Number(*i as f64)),
            (ColumnType::Float, CellValue::Boolean(b)) => {
                Some(CellValue::Number(if *b { 1.0 } else { 0.0 }))
            }
            (ColumnType::Float, CellValue::Text(s)) => {
                s.trim().parse::<f64>().ok().map(CellValue::Number)
            }

            (ColumnType::Date, CellValue::Date(d)) => Some(CellValue::Date(*d)),
            (ColumnType::Date, CellValue::Text(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(CellValue::Date),

            (ColumnType::Boolean, CellValue::Boolean(b)) => Some(CellValue::Boolean(*b)),
            (ColumnType::Boolean, CellValue::Integer(i)) => Some(CellValue::Boolean(*i != 0)),
            (ColumnType::Boolean, CellValue::Number(n)) => Some(CellValue::Boolean(*n != 0.0)),
            (ColumnType::Boolean, CellValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(CellValue::Boolean(true)),
                "false" | "no" | "0" => Some(CellValue::Boolean(false)),
                _ => None,
            },

            _ => None,
        };

        coerced.ok_or_else(|| ValueFault::Coercion {
            value: value.display_value(),
            target: self.col_type,
        })
    }

    /// Formats a typed value with this column's format.
    pub fn format(&self, value: &CellValue) -> Result<String, ValueFault> {
        match value {
            CellValue::Error(e) => Err(ValueFault::Format {
                value: e.label().to_string(),
                reason: "error values have no display form".to_string(),
            }),
            CellValue::Integer(i) => match self.format {
                NumberFormat::General | NumberFormat::Date { .. } => Ok(i.to_string()),
                _ => Ok(format_number(*i as f64, &self.format)),
            },
            CellValue::Number(n) => Ok(format_number(*n, &self.format)),
            CellValue::Date(d) => format_date(*d, &self.format).ok_or_else(|| ValueFault::Format {
                value: d.to_string(),
                reason: format!("invalid date pattern {:?}", self.format),
            }),
            other => Ok(other.display_value()),
        }
    }

    /// Formats a bare number in this column's domain. Dates are rebuilt from
    /// their day number, integers are shown without a fraction when whole.
    pub fn format_number(&self, value: f64) -> String {
        match self.col_type {
            ColumnType::Date => {
                match date_from_days(value).and_then(|d| format_date(d, &self.format)) {
                    Some(s) => s,
                    None => format_number(value, &NumberFormat::General),
                }
            }
            ColumnType::Integer if value.fract() == 0.0 => {
                self.format(&CellValue::Integer(value as i64)).unwrap_or_default()
            }
            _ => format_number(value, &self.format),
        }
    }
}
