//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Main library entry point for the table model.
//! CONTEXT: Re-exports the typed value, column and sheet types consumed by
//! the pivot engine.

pub mod cell;
pub mod column;
pub mod number_format;
pub mod sheet;

// Re-export commonly used types at the crate root
pub use cell::{CellError, CellValue};
pub use column::{Column, ColumnId, ColumnType, ValueFault};
pub use number_format::{format_date, format_number, NumberFormat};
pub use sheet::{Row, RowId, Sheet, SheetOptions, SheetView, TableError};
