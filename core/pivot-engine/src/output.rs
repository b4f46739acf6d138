//! FILENAME: core/pivot-engine/src/output.rs
//! Output columns - the generated schema of a pivot table.
//!
//! Every output column carries an `OutputColumnSpec` describing what it
//! reads from a `GroupRow`. `OutputColumn::evaluate` is the single dispatch
//! point: key columns read the row's keys, aggregate columns reduce the
//! row's source rows (or one pivot value's slice of them).

use engine::{CellValue, Column, ColumnId, Row, Sheet};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::aggregators::{Aggregator, AggregatorId, AggregatorRegistry};
use crate::error::BinningError;
use crate::row::{format_range, GroupRow, NumericKey, PivotKey};

/// Display text of an aggregate read while the table is still loading.
pub const IN_PROGRESS_TEXT: &str = "...";

/// Which key of a `GroupRow` a key column shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyColumn {
    /// Position in `GroupRow::discrete_keys`.
    Discrete(usize),
    /// The numeric bin.
    Range,
}

/// What an output column computes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OutputColumnSpec {
    Key {
        source: ColumnId,
        key: KeyColumn,
    },
    Aggregate {
        source: ColumnId,
        aggregator: AggregatorId,
        /// Restricts the reduction to rows carrying this pivot value.
        pivot: Option<PivotKey>,
    },
}

/// The value of one output cell.
#[derive(Debug, Clone, PartialEq)]
pub enum PivotCellValue {
    /// Aggregate read while the table is loading.
    InProgress,
    Value(CellValue),
    /// A bin of the numeric key column.
    Range(NumericKey),
    /// A discrete key that failed to type.
    Fault(BinningError),
}

impl PivotCellValue {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, PivotCellValue::InProgress)
    }

    /// The plain value, if there is one.
    pub fn as_value(&self) -> Option<&CellValue> {
        match self {
            PivotCellValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// What an evaluation reads besides the group row itself.
pub struct EvalContext<'a> {
    pub sheet: &'a Sheet,
    pub rows: &'a [Row],
    pub registry: &'a AggregatorRegistry,
    pub loading: bool,
}

/// One generated column.
#[derive(Debug)]
pub struct OutputColumn {
    /// Name, type, width and format the column displays with.
    pub column: Column,
    pub spec: OutputColumnSpec,
    /// Memoized aggregate values by row index; `None` until caching is enabled.
    cache: Mutex<Option<FxHashMap<usize, CellValue>>>,
}

impl OutputColumn {
    fn with_spec(column: Column, spec: OutputColumnSpec) -> Self {
        OutputColumn {
            column,
            spec,
            cache: Mutex::new(None),
        }
    }

    /// Key column over a discrete group-by column. Keeps the source's
    /// name, type, width and format.
    pub fn discrete_key(source_id: ColumnId, source: &Column, position: usize) -> Self {
        let mut column = source.clone();
        column.aggregators.clear();
        Self::with_spec(
            column,
            OutputColumnSpec::Key {
                source: source_id,
                key: KeyColumn::Discrete(position),
            },
        )
    }

    /// Key column over the binned numeric column. Ranges need twice the room.
    pub fn range_key(source_id: ColumnId, source: &Column) -> Self {
        let mut column = source.clone();
        column.aggregators.clear();
        column.width = source.width.map(|w| w * 2);
        Self::with_spec(
            column,
            OutputColumnSpec::Key {
                source: source_id,
                key: KeyColumn::Range,
            },
        )
    }

    /// Aggregate column. The name is chosen by the caller.
    pub fn aggregate(
        name: impl Into<String>,
        source_id: ColumnId,
        source: &Column,
        aggregator_id: AggregatorId,
        aggregator: &Aggregator,
        pivot: Option<PivotKey>,
    ) -> Self {
        let mut column = Column::new(name, source.index, aggregator.output_type(source));
        column.format = source.format.clone();
        Self::with_spec(
            column,
            OutputColumnSpec::Aggregate {
                source: source_id,
                aggregator: aggregator_id,
                pivot,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.column.name
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.spec, OutputColumnSpec::Aggregate { .. })
    }

    pub fn is_key(&self) -> bool {
        matches!(self.spec, OutputColumnSpec::Key { .. })
    }

    /// The pivot value this column is restricted to, if any.
    pub fn pivot(&self) -> Option<&PivotKey> {
        match &self.spec {
            OutputColumnSpec::Aggregate { pivot, .. } => pivot.as_ref(),
            OutputColumnSpec::Key { .. } => None,
        }
    }

    /// Turns on memoization. Only valid once the row model is final.
    pub fn enable_cache(&self) {
        let mut cache = self.cache.lock();
        if cache.is_none() {
            *cache = Some(FxHashMap::default());
        }
    }

    /// Drops memoized values, keeping caching enabled if it was.
    pub fn clear_cache(&self) {
        if let Some(cache) = self.cache.lock().as_mut() {
            cache.clear();
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache.lock().is_some()
    }

    /// Computes this column's value for `row` (at `row_index` in the table).
    pub fn evaluate(&self, ctx: &EvalContext<'_>, row_index: usize, row: &GroupRow) -> PivotCellValue {
        match &self.spec {
            OutputColumnSpec::Key {
                key: KeyColumn::Discrete(i),
                ..
            } => match row.discrete_keys.get(*i) {
                Some(Ok(value)) => PivotCellValue::Value(value.clone()),
                Some(Err(fault)) => PivotCellValue::Fault(fault.clone().into()),
                None => PivotCellValue::Value(CellValue::Empty),
            },

            OutputColumnSpec::Key {
                key: KeyColumn::Range,
                ..
            } => PivotCellValue::Range(row.numeric_key.clone()),

            OutputColumnSpec::Aggregate {
                source,
                aggregator,
                pivot,
            } => {
                if ctx.loading {
                    return PivotCellValue::InProgress;
                }
                if let Some(hit) = self.cache.lock().as_ref().and_then(|c| c.get(&row_index)) {
                    return PivotCellValue::Value(hit.clone());
                }

                let (Some(column), Some(aggregator)) =
                    (ctx.sheet.column(*source), ctx.registry.get(*aggregator))
                else {
                    return PivotCellValue::Value(CellValue::Empty);
                };
                let row_ids = match pivot {
                    Some(key) => row.rows_for(key),
                    None => row.source_rows.as_slice(),
                };
                let value = aggregator.aggregate(column, ctx.rows, row_ids);

                if let Some(cache) = self.cache.lock().as_mut() {
                    cache.insert(row_index, value.clone());
                }
                PivotCellValue::Value(value)
            }
        }
    }

    /// Display text of a value produced by `evaluate`.
    pub fn display(&self, value: &PivotCellValue) -> String {
        match value {
            PivotCellValue::InProgress => IN_PROGRESS_TEXT.to_string(),
            PivotCellValue::Value(v) => self
                .column
                .format(v)
                .unwrap_or_else(|_| "#ERR".to_string()),
            PivotCellValue::Range(key) => format_range(&self.column, key),
            PivotCellValue::Fault(_) => "#ERR".to_string(),
        }
    }
}
