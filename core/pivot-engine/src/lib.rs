//! FILENAME: core/pivot-engine/src/lib.rs
//! Pivot table subsystem.
//!
//! Groups the rows of an `engine::Sheet` by key columns (one of them
//! optionally binned into numeric ranges), spreads the distinct values of
//! pivot columns into output columns, and aggregates each cell lazily.
//!
//! Layers:
//! - `definition`: Serializable configuration (what the pivot table IS)
//! - `binning` / `grouping` / `row`: the row model and how it is built
//! - `planner` / `output`: the generated column schema and its evaluation
//! - `aggregators`: the registry of named reductions
//! - `table`: the asynchronous handle tying both load tasks together

pub mod logging;

pub mod aggregators;
pub mod binning;
pub mod definition;
pub mod error;
pub mod grouping;
pub mod output;
pub mod planner;
pub mod row;
pub mod table;

pub use aggregators::{AggregateAccumulator, AggregationType, Aggregator, AggregatorId, AggregatorRegistry};
pub use binning::{Bin, Binning, BinningMode};
pub use definition::{GroupingLayout, PivotDefinition};
pub use error::{BinningError, PivotError, RowFault};
pub use grouping::{group_rows, Grouping, GroupingEngine};
pub use output::{EvalContext, KeyColumn, OutputColumn, OutputColumnSpec, PivotCellValue, IN_PROGRESS_TEXT};
pub use planner::{AggregateSource, ColumnPlan, ColumnPlanner, PivotValues};
pub use row::{format_key, format_range, GroupRow, NumericKey, PivotKey, TypedKey};
pub use table::{build_pivot, PivotTable};
