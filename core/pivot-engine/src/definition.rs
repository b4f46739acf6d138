//! FILENAME: core/pivot-engine/src/definition.rs
//! Pivot Table Definition - The serializable configuration.
//!
//! This module contains the types needed to DESCRIBE a pivot table:
//! which source columns group rows and which spread into columns.
//! Validation against a concrete sheet happens in `resolve`, before any row
//! is read.

use engine::{ColumnId, Sheet};
use serde::{Deserialize, Serialize};

use crate::error::PivotError;

/// The complete, serializable definition of a pivot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotDefinition {
    /// User-friendly name. Derived from the source when unset.
    #[serde(default)]
    pub name: Option<String>,

    /// Columns whose values (or bins, if numeric) become rows.
    pub group_by: Vec<ColumnId>,

    /// Columns whose distinct values become output columns.
    #[serde(default)]
    pub pivot_columns: Vec<ColumnId>,
}

/// How the group-by columns split between discrete keys and the binned column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingLayout {
    /// Group-by columns grouped by formatted value, in definition order.
    pub discrete: Vec<ColumnId>,
    /// The single group-by column grouped by numeric range.
    pub numeric: Option<ColumnId>,
}

impl PivotDefinition {
    pub fn new(group_by: Vec<ColumnId>, pivot_columns: Vec<ColumnId>) -> Self {
        PivotDefinition {
            name: None,
            group_by,
            pivot_columns,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether `column` is grouped by numeric range rather than by value.
    pub fn is_numeric_range(sheet: &Sheet, column: ColumnId) -> bool {
        sheet.options.numeric_binning
            && sheet
                .column(column)
                .map(|c| c.col_type.is_numeric())
                .unwrap_or(false)
    }

    /// Checks the definition against `sheet` and splits the group-by columns.
    /// Fails when a column is missing or more than one column would be binned.
    pub fn resolve(&self, sheet: &Sheet) -> Result<GroupingLayout, PivotError> {
        if let Some(&missing) = self
            .group_by
            .iter()
            .chain(self.pivot_columns.iter())
            .find(|&&c| sheet.column(c).is_none())
        {
            return Err(PivotError::UnknownColumn(missing));
        }

        let (numeric, discrete): (Vec<ColumnId>, Vec<ColumnId>) = self
            .group_by
            .iter()
            .partition(|&&c| Self::is_numeric_range(sheet, c));

        if numeric.len() > 1 {
            let names = numeric
                .iter()
                .filter_map(|&c| sheet.column(c).map(|col| col.name.clone()))
                .collect();
            return Err(PivotError::MultipleNumericColumns(names));
        }

        Ok(GroupingLayout {
            discrete,
            numeric: numeric.first().copied(),
        })
    }
}
