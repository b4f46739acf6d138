//! FILENAME: core/pivot-engine/src/error.rs

use engine::{ColumnId, RowId, TableError, ValueFault};
use serde::Serialize;
use thiserror::Error;

/// Errors that stop a pivot operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PivotError {
    #[error("only one numeric column can be binned (got {})", .0.join(", "))]
    MultipleNumericColumns(Vec<String>),

    #[error("column {0} does not exist in the source")]
    UnknownColumn(ColumnId),

    #[error("unknown aggregator: {0}")]
    UnknownAggregator(String),

    #[error("{0} is not an aggregation column")]
    NotAggregateColumn(String),

    #[error("{0} is not editable")]
    NotEditable(String),

    #[error("{0} has no pivot value")]
    NotPivotColumn(String),

    #[error("row {0} is out of range")]
    RowOutOfRange(usize),

    #[error("column {0} is out of range")]
    ColumnOutOfRange(usize),

    #[error("table error: {0}")]
    Table(#[from] TableError),
}

/// Why a single source row could not be placed in a numeric bin or keyed.
/// Hashable: the error itself keys the error group the row is routed to.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum BinningError {
    #[error(transparent)]
    Value(#[from] ValueFault),

    #[error("{value} does not match any precomputed bin")]
    NoMatchingBin { value: String },
}

/// A captured per-row failure, reported alongside the derived table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFault {
    pub row: RowId,
    pub column: String,
    pub error: BinningError,
}

impl std::fmt::Display for RowFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {} column {}: {}", self.row, self.column, self.error)
    }
}
