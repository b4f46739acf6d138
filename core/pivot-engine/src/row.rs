//! FILENAME: core/pivot-engine/src/row.rs
//! Row model - one output row of a pivot table and how its keys render.

use engine::{CellValue, Column, ColumnId, RowId, ValueFault};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::binning::Bin;
use crate::error::BinningError;

/// A typed cell value, or the reason it could not be produced.
/// Failures are kept as values so they still group and key maps.
pub type TypedKey = Result<CellValue, ValueFault>;

/// Identifies the rows of a group that carry one value of one pivot column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PivotKey {
    pub column: ColumnId,
    pub value: TypedKey,
}

impl PivotKey {
    pub fn new(column: ColumnId, value: TypedKey) -> Self {
        PivotKey { column, value }
    }
}

/// Where a group sits along the numeric group-by column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NumericKey {
    /// No numeric group-by column; every discrete group has one row.
    Unbinned,
    /// A precomputed bin.
    Range(Bin),
    /// The numeric value was empty.
    Empty,
    /// The row failed to bin; the failure keys the group.
    Error(BinningError),
}

impl NumericKey {
    pub fn is_error(&self) -> bool {
        matches!(self, NumericKey::Error(_))
    }

    pub fn bin(&self) -> Option<Bin> {
        match self {
            NumericKey::Range(bin) => Some(*bin),
            _ => None,
        }
    }
}

/// One output row: the group key plus the source rows it summarizes.
#[derive(Debug, Clone)]
pub struct GroupRow {
    /// Typed values of the discrete group-by columns, in column order.
    pub discrete_keys: Vec<TypedKey>,
    pub numeric_key: NumericKey,
    /// Every source row in the group, in source order.
    pub source_rows: Vec<RowId>,
    /// Source rows of this group split by pivot value.
    pub pivot_rows: FxHashMap<PivotKey, Vec<RowId>>,
}

impl GroupRow {
    pub fn new(discrete_keys: Vec<TypedKey>, numeric_key: NumericKey) -> Self {
        GroupRow {
            discrete_keys,
            numeric_key,
            source_rows: Vec::new(),
            pivot_rows: FxHashMap::default(),
        }
    }

    /// Rows carrying `key`; empty when the value never occurs in this group.
    pub fn rows_for(&self, key: &PivotKey) -> &[RowId] {
        self.pivot_rows.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn add_pivot_row(&mut self, key: PivotKey, row: RowId) {
        self.pivot_rows.entry(key).or_default().push(row);
    }

    pub fn len(&self) -> usize {
        self.source_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_rows.is_empty()
    }
}

/// Display text of a typed key in `column`'s format.
pub fn format_key(column: &Column, key: &TypedKey) -> String {
    match key {
        Ok(value) => column.format(value).unwrap_or_else(|_| value.display_value()),
        Err(_) => "#ERR".to_string(),
    }
}

/// Display text of a numeric key: `#ERR` for failed rows, a single value
/// for single-value bins, otherwise `low - high`.
pub fn format_range(column: &Column, key: &NumericKey) -> String {
    match key {
        NumericKey::Unbinned | NumericKey::Empty => String::new(),
        NumericKey::Error(_) => "#ERR".to_string(),
        NumericKey::Range(bin) if bin.is_single_value() => column.format_number(bin.low),
        NumericKey::Range(bin) => format!(
            "{} - {}",
            column.format_number(bin.low),
            column.format_number(bin.high)
        ),
    }
}
