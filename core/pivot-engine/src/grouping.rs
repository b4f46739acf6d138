//! FILENAME: core/pivot-engine/src/grouping.rs
//! Grouping engine - one pass over the source rows producing group rows.
//!
//! Algorithm per source row:
//! 1. Type and format each discrete group-by value. Failures stay in the key
//!    as `Err(..)` so the row still groups with identical failures.
//! 2. On first sight of a formatted key tuple, create one group row per
//!    numeric bin (empty bins included) so output order never depends on
//!    data arrival order.
//! 3. Place the row in its bin, or in a lazily created empty/error group.
//! 4. Append the row to the group and to the group's per-pivot-value lists.
//!
//! Per-row failures are captured as `RowFault`s; the pass never stops for them.

use std::sync::atomic::{AtomicBool, Ordering};

use engine::{CellValue, Column, ColumnId, Row, Sheet, ValueFault};
use parking_lot::{RwLock, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::binning::Binning;
use crate::definition::GroupingLayout;
use crate::error::{BinningError, RowFault};
use crate::row::{GroupRow, NumericKey, PivotKey, TypedKey};
use crate::{log_debug, log_enter, log_error, log_exit, log_warn};

/// Source rows handled between releases of the output lock.
const PUBLISH_BATCH: usize = 1024;

/// Formatted discrete key tuple; what discrete groups are keyed by.
type FormattedKey = SmallVec<[Result<String, ValueFault>; 4]>;

/// Keys of group rows that are not precomputed bins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ExtraKey {
    Unbinned,
    Empty,
    Error(BinningError),
}

impl From<ExtraKey> for NumericKey {
    fn from(key: ExtraKey) -> Self {
        match key {
            ExtraKey::Unbinned => NumericKey::Unbinned,
            ExtraKey::Empty => NumericKey::Empty,
            ExtraKey::Error(e) => NumericKey::Error(e),
        }
    }
}

/// Output row indices belonging to one discrete key tuple.
#[derive(Debug, Default)]
struct DiscreteGroup {
    /// Pre-created row for each bin, in bin order.
    bins: Vec<usize>,
    /// Rows created on demand.
    extra: FxHashMap<ExtraKey, usize>,
}

/// Where a row lands along the numeric column.
enum Placement {
    Bin(usize),
    Empty,
    Failed(BinningError),
}

/// Result of a grouping pass. Partial when `cancelled` is set.
/// `rows` stays empty when the pass wrote into a shared sink.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub rows: Vec<GroupRow>,
    pub binning: Option<Binning>,
    pub faults: Vec<RowFault>,
    pub cancelled: bool,
}

/// Partitions source rows by discrete key, numeric bin and pivot value.
pub struct GroupingEngine<'a> {
    sheet: &'a Sheet,
    layout: &'a GroupingLayout,
    pivot_columns: &'a [ColumnId],
}

impl<'a> GroupingEngine<'a> {
    pub fn new(sheet: &'a Sheet, layout: &'a GroupingLayout, pivot_columns: &'a [ColumnId]) -> Self {
        GroupingEngine {
            sheet,
            layout,
            pivot_columns,
        }
    }

    /// Computes the bin set for the numeric group-by column, if any.
    pub fn compute_binning(&self, rows: &[Row]) -> Option<Binning> {
        let column = self.layout.numeric.and_then(|c| self.sheet.column(c))?;

        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| column.typed_value(row).ok())
            .filter_map(|value| value.as_f64())
            .collect();

        let bin_count = match self.sheet.options.histogram_bins {
            0 => Binning::default_bin_count(rows.len()),
            n => n,
        };

        let binning = Binning::compute(&values, bin_count, column.col_type.is_integral());
        log_debug!(
            "GROUP",
            "binning column={} mode={:?} bins={} width={}",
            column.name,
            binning.mode,
            binning.bin_count(),
            binning.width
        );
        Some(binning)
    }

    /// Runs the grouping pass. Checks `cancel` before each row.
    pub fn group(&self, rows: &[Row], cancel: &AtomicBool) -> Grouping {
        let sink = RwLock::new(Vec::new());
        let mut out = self.group_into(rows, cancel, &sink);
        out.rows = sink.into_inner();
        out
    }

    /// Runs the grouping pass, appending group rows to `sink` as they are
    /// created. The write lock is released every `PUBLISH_BATCH` source rows
    /// so readers see partial results. Row indices are taken from the sink,
    /// which is only ever appended to.
    pub fn group_into(&self, rows: &[Row], cancel: &AtomicBool, sink: &RwLock<Vec<GroupRow>>) -> Grouping {
        log_enter!("GROUP", "group", "rows={}", rows.len());

        let discrete_cols: Vec<&Column> = self
            .layout
            .discrete
            .iter()
            .filter_map(|&c| self.sheet.column(c))
            .collect();
        let numeric_col = self.layout.numeric.and_then(|c| self.sheet.column(c));
        let pivot_cols: Vec<(ColumnId, &Column)> = self
            .pivot_columns
            .iter()
            .filter_map(|&c| self.sheet.column(c).map(|col| (c, col)))
            .collect();

        let binning = self.compute_binning(rows);

        let mut out = Grouping {
            binning: binning.clone(),
            ..Default::default()
        };
        let mut groups: FxHashMap<FormattedKey, DiscreteGroup> = FxHashMap::default();
        let mut out_rows = sink.write();

        for (row_id, row) in rows.iter().enumerate() {
            if row_id > 0 && row_id % PUBLISH_BATCH == 0 {
                RwLockWriteGuard::bump(&mut out_rows);
            }
            if cancel.load(Ordering::Relaxed) {
                log_warn!("GROUP", "cancelled after {} of {} rows", row_id, rows.len());
                out.cancelled = true;
                break;
            }

            let discrete_keys: Vec<TypedKey> =
                discrete_cols.iter().map(|c| c.typed_value(row)).collect();
            let formatted: FormattedKey = discrete_keys
                .iter()
                .zip(&discrete_cols)
                .map(|(key, col)| key.as_ref().map_err(Clone::clone).and_then(|v| col.format(v)))
                .collect();

            for (key, col) in formatted.iter().zip(&discrete_cols) {
                if let Err(fault) = key {
                    out.faults.push(RowFault {
                        row: row_id,
                        column: col.name.clone(),
                        error: fault.clone().into(),
                    });
                }
            }

            let group = groups.entry(formatted).or_insert_with(|| {
                let mut group = DiscreteGroup::default();
                if let Some(binning) = &binning {
                    for bin in &binning.bins {
                        group.bins.push(out_rows.len());
                        out_rows.push(GroupRow::new(discrete_keys.clone(), NumericKey::Range(*bin)));
                    }
                }
                group
            });

            let extra_key = match (numeric_col, &binning) {
                (Some(col), Some(binning)) => match Self::place(col, binning, row) {
                    Placement::Bin(idx) => match group.bins.get(idx) {
                        Some(&target) => Ok(target),
                        None => Err(ExtraKey::Error(BinningError::NoMatchingBin {
                            value: col.get_value(row).display_value(),
                        })),
                    },
                    Placement::Empty => Err(ExtraKey::Empty),
                    Placement::Failed(error) => Err(ExtraKey::Error(error)),
                },
                _ => Err(ExtraKey::Unbinned),
            };

            let target = match extra_key {
                Ok(target) => target,
                Err(key) => {
                    if let (ExtraKey::Error(error), Some(col)) = (&key, numeric_col) {
                        if matches!(error, BinningError::NoMatchingBin { .. }) {
                            log_error!("GROUP", "row {} column {}: {}", row_id, col.name, error);
                        }
                        out.faults.push(RowFault {
                            row: row_id,
                            column: col.name.clone(),
                            error: error.clone(),
                        });
                    }
                    *group.extra.entry(key.clone()).or_insert_with(|| {
                        out_rows.push(GroupRow::new(discrete_keys.clone(), key.into()));
                        out_rows.len() - 1
                    })
                }
            };

            let group_row = &mut out_rows[target];
            group_row.source_rows.push(row_id);
            for &(column_id, col) in &pivot_cols {
                group_row.add_pivot_row(PivotKey::new(column_id, col.typed_value(row)), row_id);
            }
        }

        log_exit!(
            "GROUP",
            "group",
            "groups={} rows={} faults={}",
            groups.len(),
            out_rows.len(),
            out.faults.len()
        );
        out
    }

    /// Resolves the bin of one row's numeric value.
    fn place(column: &Column, binning: &Binning, row: &Row) -> Placement {
        match column.typed_value(row) {
            Ok(CellValue::Empty) => Placement::Empty,
            Ok(value) => match value.as_f64() {
                Some(number) => match binning.locate(number) {
                    Ok(idx) => Placement::Bin(idx),
                    Err(error) => Placement::Failed(error),
                },
                None => Placement::Failed(BinningError::Value(ValueFault::Coercion {
                    value: value.display_value(),
                    target: column.col_type,
                })),
            },
            Err(fault) => Placement::Failed(fault.into()),
        }
    }
}

/// Runs `group` with a cancel flag that is never set.
pub fn group_rows(
    sheet: &Sheet,
    layout: &GroupingLayout,
    pivot_columns: &[ColumnId],
    rows: &[Row],
) -> Grouping {
    GroupingEngine::new(sheet, layout, pivot_columns).group(rows, &AtomicBool::new(false))
}
