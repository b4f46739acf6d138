//! FILENAME: core/pivot-engine/src/aggregators.rs
//! Aggregator registry - named reductions over a list of source rows.
//!
//! Aggregators are pure: `aggregate(column, rows)` reads the column's typed
//! value from each row and reduces them to one value. The registry is an
//! explicit table handed to the planner and the pivot table, never global.

use engine::cell::date_from_days;
use engine::{CellValue, Column, ColumnType, Row, RowId};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::PivotError;

/// Index of an aggregator within its registry.
pub type AggregatorId = usize;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    Count,
    Distinct,
    Sum,
    Average,
    Min,
    Max,
    Median,
    StdDev,
    Var,
    Product,
}

/// Accumulator for computing numeric aggregates incrementally.
/// Uses Welford's algorithm for variance.
#[derive(Debug, Clone, Default)]
pub struct AggregateAccumulator {
    pub sum: f64,
    pub count_numbers: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub product: f64,
    pub m2: f64,
    pub mean: f64,
}

impl AggregateAccumulator {
    pub fn new() -> Self {
        AggregateAccumulator {
            product: 1.0,
            ..Default::default()
        }
    }

    /// Adds a numeric value to the accumulator.
    pub fn add_number(&mut self, value: f64) {
        self.count_numbers += 1;
        self.sum += value;
        self.product *= value;

        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));

        let delta = value - self.mean;
        self.mean += delta / (self.count_numbers as f64);
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Computes a numeric aggregate. `None` when no numbers were seen
    /// (or fewer than two, for the sample statistics).
    pub fn compute(&self, aggregation: AggregationType) -> Option<f64> {
        let n = self.count_numbers;
        if n == 0 {
            return None;
        }
        match aggregation {
            AggregationType::Sum => Some(self.sum),
            AggregationType::Average => Some(self.sum / n as f64),
            AggregationType::Min => self.min,
            AggregationType::Max => self.max,
            AggregationType::Product => Some(self.product),
            AggregationType::Var if n > 1 => Some(self.m2 / (n - 1) as f64),
            AggregationType::StdDev if n > 1 => Some((self.m2 / (n - 1) as f64).sqrt()),
            AggregationType::Count => Some(n as f64),
            _ => None,
        }
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// A named reduction with an optional result type override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregator {
    pub name: String,
    pub aggregation: AggregationType,
    /// When `None`, results take the aggregated column's type.
    pub result_type: Option<ColumnType>,
}

impl Aggregator {
    pub fn new(name: impl Into<String>, aggregation: AggregationType, result_type: Option<ColumnType>) -> Self {
        Aggregator {
            name: name.into(),
            aggregation,
            result_type,
        }
    }

    /// Type of the values this aggregator yields for `source`.
    pub fn output_type(&self, source: &Column) -> ColumnType {
        self.result_type.unwrap_or(source.col_type)
    }

    /// Reduces `column` over the rows named by `row_ids`.
    pub fn aggregate(&self, column: &Column, rows: &[Row], row_ids: &[RowId]) -> CellValue {
        let typed = row_ids
            .iter()
            .filter_map(|&id| rows.get(id))
            .filter_map(|row| column.typed_value(row).ok());

        match self.aggregation {
            AggregationType::Count => CellValue::Integer(row_ids.len() as i64),
            AggregationType::Distinct => {
                let distinct: FxHashSet<CellValue> = typed.collect();
                CellValue::Integer(distinct.len() as i64)
            }
            AggregationType::Median => {
                let mut numbers: Vec<f64> = typed.filter_map(|v| v.as_f64()).collect();
                if numbers.is_empty() {
                    return CellValue::Empty;
                }
                numbers.sort_by(|a, b| a.total_cmp(b));
                let mid = numbers.len() / 2;
                let median = if numbers.len() % 2 == 0 {
                    (numbers[mid - 1] + numbers[mid]) / 2.0
                } else {
                    numbers[mid]
                };
                self.to_output(median, column)
            }
            aggregation => {
                let mut acc = AggregateAccumulator::new();
                for number in typed.filter_map(|v| v.as_f64()) {
                    acc.add_number(number);
                }
                match acc.compute(aggregation) {
                    Some(result) => self.to_output(result, column),
                    None => CellValue::Empty,
                }
            }
        }
    }

    /// Wraps a numeric result in the output type.
    fn to_output(&self, value: f64, column: &Column) -> CellValue {
        match self.output_type(column) {
            ColumnType::Integer if value.fract() == 0.0 && value.is_finite() => {
                CellValue::Integer(value as i64)
            }
            ColumnType::Date => match date_from_days(value) {
                Some(day) => CellValue::Date(day),
                None => CellValue::Number(value),
            },
            _ => CellValue::Number(value),
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Immutable-after-construction table of aggregators and named choices.
#[derive(Debug, Clone)]
pub struct AggregatorRegistry {
    aggregators: Vec<Aggregator>,
    by_name: FxHashMap<String, AggregatorId>,
    /// Choice name -> aggregators it expands to (a plain name maps to itself).
    choices: FxHashMap<String, Vec<AggregatorId>>,
    count_id: AggregatorId,
}

impl AggregatorRegistry {
    /// Creates a registry with the built-in aggregators.
    pub fn new() -> Self {
        let mut registry = AggregatorRegistry {
            aggregators: Vec::new(),
            by_name: FxHashMap::default(),
            choices: FxHashMap::default(),
            count_id: 0,
        };

        registry.count_id = registry.register(Aggregator::new(
            "count",
            AggregationType::Count,
            Some(ColumnType::Integer),
        ));
        registry.register(Aggregator::new("distinct", AggregationType::Distinct, Some(ColumnType::Integer)));
        registry.register(Aggregator::new("sum", AggregationType::Sum, None));
        registry.register(Aggregator::new("avg", AggregationType::Average, Some(ColumnType::Float)));
        registry.register(Aggregator::new("min", AggregationType::Min, None));
        registry.register(Aggregator::new("max", AggregationType::Max, None));
        registry.register(Aggregator::new("median", AggregationType::Median, Some(ColumnType::Float)));
        registry.register(Aggregator::new("stdev", AggregationType::StdDev, Some(ColumnType::Float)));
        registry.register(Aggregator::new("var", AggregationType::Var, Some(ColumnType::Float)));
        registry.register(Aggregator::new("product", AggregationType::Product, None));

        let summary = ["min", "max", "avg"]
            .iter()
            .filter_map(|n| registry.lookup(n))
            .collect();
        registry.choices.insert("summary".to_string(), summary);

        registry
    }

    /// Adds (or replaces) an aggregator under its name.
    pub fn register(&mut self, aggregator: Aggregator) -> AggregatorId {
        let name = aggregator.name.clone();
        let id = match self.by_name.get(&name) {
            Some(&existing) => {
                self.aggregators[existing] = aggregator;
                existing
            }
            None => {
                self.aggregators.push(aggregator);
                self.aggregators.len() - 1
            }
        };
        self.by_name.insert(name.clone(), id);
        self.choices.insert(name, vec![id]);
        id
    }

    /// Adds a named choice expanding to several registered aggregators.
    pub fn register_choice(&mut self, name: &str, members: &[&str]) -> Result<(), PivotError> {
        let ids = members
            .iter()
            .map(|m| self.lookup(m).ok_or_else(|| PivotError::UnknownAggregator(m.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        self.choices.insert(name.to_string(), ids);
        Ok(())
    }

    pub fn get(&self, id: AggregatorId) -> Option<&Aggregator> {
        self.aggregators.get(id)
    }

    pub fn lookup(&self, name: &str) -> Option<AggregatorId> {
        self.by_name.get(name).copied()
    }

    /// The default aggregator.
    pub fn count(&self) -> AggregatorId {
        self.count_id
    }

    /// Expands a user choice into aggregator ids.
    pub fn resolve_choice(&self, choice: &str) -> Result<Vec<AggregatorId>, PivotError> {
        self.choices
            .get(choice)
            .cloned()
            .ok_or_else(|| PivotError::UnknownAggregator(choice.to_string()))
    }

    pub fn len(&self) -> usize {
        self.aggregators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }
}

impl Default for AggregatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
