//! FILENAME: core/pivot-engine/src/planner.rs
//! Column planner - derives the output schema of a pivot table.
//!
//! Key columns come from the definition alone. Aggregate columns need the
//! distinct values of the pivot columns, found by one scan of the source
//! that can run alongside the grouping pass.

use std::sync::atomic::{AtomicBool, Ordering};

use engine::{ColumnId, Row, Sheet};
use rustc_hash::FxHashSet;

use crate::aggregators::{AggregatorId, AggregatorRegistry};
use crate::definition::{GroupingLayout, PivotDefinition};
use crate::error::PivotError;
use crate::output::OutputColumn;
use crate::row::{format_key, PivotKey, TypedKey};
use crate::{log_debug, log_enter, log_exit, log_warn};

/// A source column and the aggregators applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSource {
    pub column: ColumnId,
    pub aggregators: Vec<AggregatorId>,
}

/// Distinct values of one pivot column in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotValues {
    pub column: ColumnId,
    pub values: Vec<TypedKey>,
}

/// Aggregate columns produced by a planning scan.
#[derive(Debug, Default)]
pub struct ColumnPlan {
    pub columns: Vec<OutputColumn>,
    pub pivot_values: Vec<PivotValues>,
    pub cancelled: bool,
}

pub struct ColumnPlanner<'a> {
    sheet: &'a Sheet,
    definition: &'a PivotDefinition,
    layout: &'a GroupingLayout,
    registry: &'a AggregatorRegistry,
}

impl<'a> ColumnPlanner<'a> {
    pub fn new(
        sheet: &'a Sheet,
        definition: &'a PivotDefinition,
        layout: &'a GroupingLayout,
        registry: &'a AggregatorRegistry,
    ) -> Self {
        ColumnPlanner {
            sheet,
            definition,
            layout,
            registry,
        }
    }

    /// One key column per group-by column that is not also pivoted.
    pub fn key_columns(&self) -> Vec<OutputColumn> {
        let mut columns = Vec::new();
        for &id in &self.definition.group_by {
            if self.definition.pivot_columns.contains(&id) {
                continue;
            }
            let Some(source) = self.sheet.column(id) else {
                continue;
            };

            if self.layout.numeric == Some(id) {
                columns.push(OutputColumn::range_key(id, source));
            } else if let Some(position) = self.layout.discrete.iter().position(|&c| c == id) {
                columns.push(OutputColumn::discrete_key(id, source, position));
            }
        }
        columns
    }

    /// Columns to aggregate: visible columns marked with aggregators, or a
    /// count over each pivot column when none are marked.
    pub fn aggregate_sources(&self) -> Result<Vec<AggregateSource>, PivotError> {
        let mut marked = Vec::new();
        for (id, column) in self.sheet.visible_columns() {
            if column.aggregators.is_empty() {
                continue;
            }
            let mut aggregators = Vec::new();
            for name in &column.aggregators {
                aggregators.extend(self.registry.resolve_choice(name)?);
            }
            marked.push(AggregateSource {
                column: id,
                aggregators,
            });
        }

        if !marked.is_empty() {
            return Ok(marked);
        }

        let count = self.registry.count();
        Ok(self
            .definition
            .pivot_columns
            .iter()
            .map(|&column| AggregateSource {
                column,
                aggregators: vec![count],
            })
            .collect())
    }

    /// Table name used when the definition carries none.
    pub fn table_name(&self, sources: &[AggregateSource]) -> String {
        if self.definition.pivot_columns.is_empty() {
            return format!("{}_pivot", self.sheet.name);
        }

        let pivot_names: String = self
            .definition
            .pivot_columns
            .iter()
            .filter_map(|&c| self.sheet.column(c))
            .map(|c| c.name.as_str())
            .collect();
        let mut name = format!("{}_pivot_{}", self.sheet.name, pivot_names);

        if let [only] = sources {
            if let [aggregator] = only.aggregators.as_slice() {
                if let Some(agg) = self.registry.get(*aggregator) {
                    name.push('_');
                    name.push_str(&agg.name);
                }
            }
        }
        name
    }

    /// Distinct values per pivot column, in first-seen order.
    /// The flag is set when `cancel` interrupted the scan.
    pub fn discover_pivot_values(&self, rows: &[Row], cancel: &AtomicBool) -> (Vec<PivotValues>, bool) {
        let columns: Vec<(ColumnId, &engine::Column)> = self
            .definition
            .pivot_columns
            .iter()
            .filter_map(|&c| self.sheet.column(c).map(|col| (c, col)))
            .collect();

        let mut found: Vec<PivotValues> = columns
            .iter()
            .map(|&(column, _)| PivotValues {
                column,
                values: Vec::new(),
            })
            .collect();
        let mut seen: Vec<FxHashSet<TypedKey>> = vec![FxHashSet::default(); columns.len()];

        for (row_id, row) in rows.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                log_warn!("PLAN", "pivot scan cancelled after {} of {} rows", row_id, rows.len());
                return (found, true);
            }
            for (i, (_, column)) in columns.iter().enumerate() {
                let value = column.typed_value(row);
                if seen[i].insert(value.clone()) {
                    found[i].values.push(value);
                }
            }
        }
        (found, false)
    }

    /// Builds the aggregate columns for `sources`.
    pub fn plan(&self, sources: &[AggregateSource], rows: &[Row], cancel: &AtomicBool) -> ColumnPlan {
        log_enter!("PLAN", "plan", "sources={} rows={}", sources.len(), rows.len());
        let mut plan = ColumnPlan::default();

        if sources.is_empty() {
            log_exit!("PLAN", "plan", "no aggregate columns");
            return plan;
        }

        if self.definition.pivot_columns.is_empty() {
            for source in sources {
                for &agg in &source.aggregators {
                    if let Some(col) = self.aggregate_column(source.column, agg, None, None) {
                        plan.columns.push(col);
                    }
                }
            }
            log_exit!("PLAN", "plan", "columns={}", plan.columns.len());
            return plan;
        }

        let (pivot_values, cancelled) = self.discover_pivot_values(rows, cancel);
        let many_pivots = self.definition.pivot_columns.len() > 1;
        let many_sources = sources.len() > 1;

        for found in &pivot_values {
            let Some(pivot_col) = self.sheet.column(found.column) else {
                continue;
            };
            for value in &found.values {
                let value_name = if many_pivots {
                    format!("{}_{}", pivot_col.name, format_key(pivot_col, value))
                } else {
                    format_key(pivot_col, value)
                };

                for source in sources {
                    let prefixed = many_sources || source.aggregators.len() > 1;
                    for &agg in &source.aggregators {
                        let name = if prefixed {
                            let prefix = self.aggregate_prefix(source.column, agg, many_sources);
                            format!("{}_{}", prefix, value_name)
                        } else {
                            value_name.clone()
                        };
                        let key = PivotKey::new(found.column, value.clone());
                        if let Some(col) = self.aggregate_column(source.column, agg, Some(name), Some(key)) {
                            plan.columns.push(col);
                        }
                    }
                }
            }
            log_debug!(
                "PLAN",
                "pivot column {} has {} distinct values",
                pivot_col.name,
                found.values.len()
            );
        }

        plan.pivot_values = pivot_values;
        plan.cancelled = cancelled;
        log_exit!("PLAN", "plan", "columns={} cancelled={}", plan.columns.len(), cancelled);
        plan
    }

    /// `<source>_<aggregator>` when several columns are aggregated, else `<aggregator>`.
    fn aggregate_prefix(&self, source: ColumnId, aggregator: AggregatorId, with_source: bool) -> String {
        let agg_name = self.registry.get(aggregator).map(|a| a.name.as_str()).unwrap_or_default();
        match self.sheet.column(source) {
            Some(col) if with_source => format!("{}_{}", col.name, agg_name),
            _ => agg_name.to_string(),
        }
    }

    /// An aggregate column named `name`, or `<source>_<aggregator>` when unnamed.
    pub fn aggregate_column(
        &self,
        source: ColumnId,
        aggregator: AggregatorId,
        name: Option<String>,
        pivot: Option<PivotKey>,
    ) -> Option<OutputColumn> {
        let column = self.sheet.column(source)?;
        let agg = self.registry.get(aggregator)?;
        let name = name.unwrap_or_else(|| format!("{}_{}", column.name, agg.name));
        Some(OutputColumn::aggregate(name, source, column, aggregator, agg, pivot))
    }
}
