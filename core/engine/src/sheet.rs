//! FILENAME: core/engine/src/sheet.rs
//! PURPOSE: The source table: columns, options and the row store.
//! CONTEXT: Rows live behind a read/write lock. Long scans take one read
//! snapshot for their whole duration; key edits take the write lock only to
//! push a value back into the rows of a group.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::CellValue;
use crate::column::{Column, ColumnId};

/// One source row: values indexed by `Column::index`.
pub type Row = Vec<CellValue>;

/// Index of a row within its sheet.
pub type RowId = usize;

/// Errors raised by sheet mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("column {0} does not exist")]
    UnknownColumn(ColumnId),

    #[error("row {row} is out of range (sheet has {count} rows)")]
    RowOutOfRange { row: RowId, count: usize },
}

/// Per-sheet options consulted by derived tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetOptions {
    /// Bin numeric group-by columns into ranges instead of grouping by value.
    #[serde(default)]
    pub numeric_binning: bool,

    /// Fixed number of bins for numeric grouping. 0 picks one from the row count.
    #[serde(default)]
    pub histogram_bins: usize,
}

impl Default for SheetOptions {
    fn default() -> Self {
        SheetOptions {
            numeric_binning: false,
            histogram_bins: 0,
        }
    }
}

/// A named table of typed columns over a shared row store.
#[derive(Debug)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<Column>,
    pub options: SheetOptions,
    rows: RwLock<Vec<Row>>,
}

impl Sheet {
    /// Creates a new, empty sheet.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Sheet {
            name: name.into(),
            columns,
            options: SheetOptions::default(),
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn with_options(mut self, options: SheetOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        *self.rows.write() = rows;
        self
    }

    pub fn push_row(&self, row: Row) -> RowId {
        let mut rows = self.rows.write();
        rows.push(row);
        rows.len() - 1
    }

    /// Read snapshot of all rows. Writers block until it is dropped.
    pub fn rows(&self) -> RwLockReadGuard<'_, Vec<Row>> {
        self.rows.read()
    }

    /// Count hint for progress reporting.
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id)
    }

    pub fn column_by_name(&self, name: &str) -> Option<ColumnId> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = (ColumnId, &Column)> {
        self.columns.iter().enumerate().filter(|(_, c)| !c.hidden)
    }

    /// Stores `value` into `column` for every row in `row_ids`.
    /// All ids are checked before anything is written.
    pub fn set_values(
        &self,
        column: ColumnId,
        row_ids: &[RowId],
        value: &CellValue,
    ) -> Result<(), TableError> {
        let index = self
            .columns
            .get(column)
            .map(|c| c.index)
            .ok_or(TableError::UnknownColumn(column))?;

        let mut rows = self.rows.write();
        let count = rows.len();
        if let Some(&row) = row_ids.iter().find(|&&r| r >= count) {
            return Err(TableError::RowOutOfRange { row, count });
        }

        for &row_id in row_ids {
            let row = &mut rows[row_id];
            if row.len() <= index {
                row.resize(index + 1, CellValue::Empty);
            }
            row[index] = value.clone();
        }
        Ok(())
    }
}

/// A named subset of a sheet's rows. Drill-down results are views, not copies.
#[derive(Debug, Clone)]
pub struct SheetView {
    pub name: String,
    pub source: Arc<Sheet>,
    pub row_ids: Vec<RowId>,
}

impl SheetView {
    pub fn new(name: impl Into<String>, source: Arc<Sheet>, row_ids: Vec<RowId>) -> Self {
        SheetView {
            name: name.into(),
            source,
            row_ids,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_ids.len()
    }

    /// Copies out the viewed rows in view order.
    pub fn materialize(&self) -> Vec<Row> {
        let rows = self.source.rows();
        self.row_ids
            .iter()
            .filter_map(|&id| rows.get(id).cloned())
            .collect()
    }
}
