//! FILENAME: core/pivot-engine/src/table.rs
//! PURPOSE: The derived pivot table handle and its background load.
//! CONTEXT: `build_pivot` validates the definition, creates the key columns and
//! returns at once. A loader thread then runs the column planner and the
//! grouping engine side by side over one read snapshot of the source. Group
//! rows become visible in batches while the pass runs and generated columns as
//! soon as the planner finishes. Aggregates read before `loading` clears are
//! `PivotCellValue::InProgress`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use engine::{CellValue, Sheet, SheetView};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::aggregators::AggregatorRegistry;
use crate::binning::Binning;
use crate::definition::{GroupingLayout, PivotDefinition};
use crate::error::{PivotError, RowFault};
use crate::grouping::{Grouping, GroupingEngine};
use crate::output::{EvalContext, KeyColumn, OutputColumn, OutputColumnSpec, PivotCellValue};
use crate::planner::{AggregateSource, ColumnPlanner};
use crate::row::{format_key, GroupRow};
use crate::{log_debug, log_error, log_info, log_warn};

/// A pivot table derived from a source sheet.
pub struct PivotTable {
    name: String,
    source: Arc<Sheet>,
    definition: PivotDefinition,
    layout: GroupingLayout,
    registry: Arc<AggregatorRegistry>,
    columns: RwLock<Vec<Arc<OutputColumn>>>,
    rows: RwLock<Vec<GroupRow>>,
    binning: RwLock<Option<Binning>>,
    faults: RwLock<Vec<RowFault>>,
    loading: AtomicBool,
    cancelled: AtomicBool,
    loader: Mutex<Option<JoinHandle<()>>>,
}

/// Starts building a pivot of `source`. Returns as soon as the definition is
/// validated; the rows and aggregate columns arrive in the background.
pub fn build_pivot(
    source: Arc<Sheet>,
    definition: PivotDefinition,
    registry: Arc<AggregatorRegistry>,
) -> Result<Arc<PivotTable>, PivotError> {
    log_info!(
        "PIVOT",
        "build_pivot source={} group_by={:?} pivot={:?}",
        source.name,
        definition.group_by,
        definition.pivot_columns
    );

    let layout = definition.resolve(&source).map_err(|e| {
        log_error!("PIVOT", "invalid pivot definition: {}", e);
        e
    })?;

    let planner = ColumnPlanner::new(&source, &definition, &layout, &registry);
    let sources = planner.aggregate_sources().map_err(|e| {
        log_error!("PIVOT", "invalid aggregators: {}", e);
        e
    })?;
    let name = definition
        .name
        .clone()
        .unwrap_or_else(|| planner.table_name(&sources));
    let key_columns: Vec<Arc<OutputColumn>> =
        planner.key_columns().into_iter().map(Arc::new).collect();

    let table = Arc::new(PivotTable {
        name,
        source: Arc::clone(&source),
        definition: definition.clone(),
        layout: layout.clone(),
        registry,
        columns: RwLock::new(key_columns),
        rows: RwLock::new(Vec::new()),
        binning: RwLock::new(None),
        faults: RwLock::new(Vec::new()),
        loading: AtomicBool::new(true),
        cancelled: AtomicBool::new(false),
        loader: Mutex::new(None),
    });

    let worker = Arc::clone(&table);
    let worker_sources = sources.clone();
    let spawned = thread::Builder::new()
        .name(format!("pivot-{}", table.name))
        .spawn(move || worker.load(&worker_sources));

    match spawned {
        Ok(handle) => *table.loader.lock() = Some(handle),
        Err(e) => {
            log_warn!("PIVOT", "could not start loader thread ({}), loading inline", e);
            table.load(&sources);
        }
    }

    Ok(table)
}

impl PivotTable {
    /// Runs both load tasks. Group rows land in `self.rows` while the pass
    /// runs; generated columns are appended as soon as the planner is done.
    fn load(&self, sources: &[AggregateSource]) {
        let started = Instant::now();
        let planner = ColumnPlanner::new(&self.source, &self.definition, &self.layout, &self.registry);
        let grouper = GroupingEngine::new(&self.source, &self.layout, &self.definition.pivot_columns);

        let (plan_cancelled, grouping) = {
            let snapshot = self.source.rows();
            let rows: &[engine::Row] = &snapshot;
            thread::scope(|scope| {
                let plan_task = scope.spawn(|| {
                    let plan = planner.plan(sources, rows, &self.cancelled);
                    self.columns
                        .write()
                        .extend(plan.columns.into_iter().map(Arc::new));
                    plan.cancelled
                });
                let grouping = grouper.group_into(rows, &self.cancelled, &self.rows);
                let plan_cancelled = plan_task.join().unwrap_or_else(|_| {
                    log_error!("PIVOT", "column planner panicked; no aggregate columns added");
                    true
                });
                (plan_cancelled, grouping)
            })
        };

        self.finish(plan_cancelled || grouping.cancelled, grouping);
        log_info!(
            "PIVOT",
            "loaded {} in {:?}: {} rows, {} columns, {} faults",
            self.name,
            started.elapsed(),
            self.row_count(),
            self.column_count(),
            self.faults.read().len()
        );
    }

    fn finish(&self, cancelled: bool, grouping: Grouping) {
        for fault in &grouping.faults {
            log_debug!("PIVOT", "{}", fault);
        }
        if !grouping.faults.is_empty() {
            log_warn!("PIVOT", "{} rows could not be grouped cleanly", grouping.faults.len());
        }

        *self.binning.write() = grouping.binning;
        *self.faults.write() = grouping.faults;

        if cancelled {
            log_warn!("PIVOT", "load of {} cancelled; keeping partial results", self.name);
        } else {
            for column in self.columns.read().iter().filter(|c| c.is_aggregate()) {
                column.enable_cache();
            }
        }
        self.loading.store(false, Ordering::Release);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<Sheet> {
        &self.source
    }

    pub fn definition(&self) -> &PivotDefinition {
        &self.definition
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Whether the last load was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Asks both load tasks to stop at the next row.
    pub fn cancel(&self) {
        log_info!("PIVOT", "cancel requested for {}", self.name);
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Blocks until the load has finished.
    pub fn wait(&self) {
        let handle = self.loader.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log_error!("PIVOT", "loader thread for {} panicked", self.name);
                self.loading.store(false, Ordering::Release);
            }
        }
    }

    pub fn rows(&self) -> RwLockReadGuard<'_, Vec<GroupRow>> {
        self.rows.read()
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Snapshot of the current column list.
    pub fn columns(&self) -> Vec<Arc<OutputColumn>> {
        self.columns.read().clone()
    }

    pub fn column_count(&self) -> usize {
        self.columns.read().len()
    }

    pub fn column(&self, index: usize) -> Result<Arc<OutputColumn>, PivotError> {
        self.columns
            .read()
            .get(index)
            .cloned()
            .ok_or(PivotError::ColumnOutOfRange(index))
    }

    pub fn column_by_name(&self, name: &str) -> Option<usize> {
        self.columns.read().iter().position(|c| c.name() == name)
    }

    pub fn binning(&self) -> Option<Binning> {
        self.binning.read().clone()
    }

    /// Per-row failures captured while grouping.
    pub fn faults(&self) -> Vec<RowFault> {
        self.faults.read().clone()
    }

    /// Value of the cell at (`row`, `col`).
    pub fn value(&self, row: usize, col: usize) -> Result<PivotCellValue, PivotError> {
        let column = self.column(col)?;
        let loading = self.is_loading();
        let rows = self.rows.read();
        let group = rows.get(row).ok_or(PivotError::RowOutOfRange(row))?;

        // The loader holds the source snapshot until `loading` clears, and a
        // key cell never reads source rows.
        if loading || column.is_key() {
            let ctx = EvalContext {
                sheet: &self.source,
                rows: &[],
                registry: &self.registry,
                loading,
            };
            return Ok(column.evaluate(&ctx, row, group));
        }

        let source_rows = self.source.rows();
        let ctx = EvalContext {
            sheet: &self.source,
            rows: &source_rows,
            registry: &self.registry,
            loading,
        };
        Ok(column.evaluate(&ctx, row, group))
    }

    /// Display text of the cell at (`row`, `col`).
    pub fn display(&self, row: usize, col: usize) -> Result<String, PivotError> {
        let value = self.value(row, col)?;
        Ok(self.column(col)?.display(&value))
    }

    /// View of every source row in group `row`.
    pub fn open_row(&self, row: usize) -> Result<SheetView, PivotError> {
        let rows = self.rows.read();
        let group = rows.get(row).ok_or(PivotError::RowOutOfRange(row))?;

        let keys: Vec<String> = self
            .layout
            .discrete
            .iter()
            .zip(&group.discrete_keys)
            .filter_map(|(&id, key)| self.source.column(id).map(|c| format_key(c, key)))
            .collect();
        let name = format!("{}_{}", self.source.name, keys.join("+"));

        Ok(SheetView::new(name, Arc::clone(&self.source), group.source_rows.clone()))
    }

    /// View of the source rows behind one aggregate cell.
    pub fn open_cell(&self, row: usize, col: usize) -> Result<SheetView, PivotError> {
        let column = self.column(col)?;
        let rows = self.rows.read();
        let group = rows.get(row).ok_or(PivotError::RowOutOfRange(row))?;

        match &column.spec {
            OutputColumnSpec::Aggregate { pivot: Some(key), .. } => {
                let value = self
                    .source
                    .column(key.column)
                    .map(|c| format_key(c, &key.value))
                    .unwrap_or_default();
                let name = format!("{}_{}", self.source.name, value);
                Ok(SheetView::new(name, Arc::clone(&self.source), group.rows_for(key).to_vec()))
            }
            OutputColumnSpec::Aggregate { pivot: None, .. } => {
                let name = format!("{}_{}", self.source.name, column.name());
                Ok(SheetView::new(name, Arc::clone(&self.source), group.source_rows.clone()))
            }
            OutputColumnSpec::Key { .. } => Err(PivotError::NotPivotColumn(column.name().to_string())),
        }
    }

    /// Adds one unpivoted column per aggregator in `choices`, over the same
    /// source column as aggregate column `col`, right after it.
    /// Returns the number of columns added.
    pub fn add_aggregate_columns(&self, col: usize, choices: &[&str]) -> Result<usize, PivotError> {
        let column = self.column(col)?;
        let OutputColumnSpec::Aggregate { source, .. } = column.spec else {
            return Err(PivotError::NotAggregateColumn(column.name().to_string()));
        };

        let mut aggregators = Vec::new();
        for choice in choices {
            aggregators.extend(self.registry.resolve_choice(choice)?);
        }

        let planner = ColumnPlanner::new(&self.source, &self.definition, &self.layout, &self.registry);
        let added: Vec<Arc<OutputColumn>> = aggregators
            .into_iter()
            .filter_map(|agg| planner.aggregate_column(source, agg, None, None))
            .map(Arc::new)
            .collect();

        if !self.is_loading() {
            for c in &added {
                c.enable_cache();
            }
        }

        let count = added.len();
        let mut columns = self.columns.write();
        let at = (col + 1).min(columns.len());
        columns.splice(at..at, added);
        log_info!("PIVOT", "added {} aggregate columns after {}", count, column.name());
        Ok(count)
    }

    /// Edits a discrete key of group `row` and writes the value to every
    /// source row in the group. The row is not regrouped.
    pub fn set_key(&self, row: usize, col: usize, value: CellValue) -> Result<(), PivotError> {
        let column = self.column(col)?;
        let (source, position) = match column.spec {
            OutputColumnSpec::Key {
                source,
                key: KeyColumn::Discrete(position),
            } => (source, position),
            _ => return Err(PivotError::NotEditable(column.name().to_string())),
        };
        let source_column = self
            .source
            .column(source)
            .ok_or(PivotError::UnknownColumn(source))?;

        let source_rows = self
            .rows
            .read()
            .get(row)
            .map(|g| g.source_rows.clone())
            .ok_or(PivotError::RowOutOfRange(row))?;

        self.source.set_values(source, &source_rows, &value)?;

        if let Some(group) = self.rows.write().get_mut(row) {
            if let Some(key) = group.discrete_keys.get_mut(position) {
                *key = source_column.coerce(&value);
            }
        }
        for c in self.columns.read().iter() {
            c.clear_cache();
        }
        log_debug!(
            "PIVOT",
            "set {} on {} source rows of group {}",
            column.name(),
            source_rows.len(),
            row
        );
        Ok(())
    }
}

impl std::fmt::Debug for PivotTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PivotTable")
            .field("name", &self.name)
            .field("source", &self.source.name)
            .field("loading", &self.is_loading())
            .field("rows", &self.row_count())
            .field("columns", &self.column_count())
            .finish()
    }
}
