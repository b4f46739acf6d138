//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for pivot engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use engine::{CellValue, Column, ColumnType, Row, Sheet, SheetOptions};
use pivot_engine::{build_pivot, AggregatorRegistry, PivotCellValue, PivotDefinition, PivotTable};

pub const REGION: usize = 0;
pub const PRODUCT: usize = 1;
pub const QUARTER: usize = 2;
pub const SALES: usize = 3;
pub const QUANTITY: usize = 4;

/// Builds source sheets and pivots over them.
pub struct TestHarness {
    pub sheet: Arc<Sheet>,
    pub registry: Arc<AggregatorRegistry>,
}

impl TestHarness {
    /// Harness over the sales fixture with default options.
    pub fn new() -> Self {
        Self::with_sheet(SalesFixture::sheet(SheetOptions::default(), &[]))
    }

    /// Harness over the sales fixture with numeric binning switched on.
    pub fn with_binning(histogram_bins: usize) -> Self {
        let options = SheetOptions {
            numeric_binning: true,
            histogram_bins,
        };
        Self::with_sheet(SalesFixture::sheet(options, &[]))
    }

    pub fn with_sheet(sheet: Sheet) -> Self {
        TestHarness {
            sheet: Arc::new(sheet),
            registry: Arc::new(AggregatorRegistry::new()),
        }
    }

    /// Builds a pivot and waits for it to finish loading.
    pub fn pivot(&self, group_by: Vec<usize>, pivot_columns: Vec<usize>) -> Arc<PivotTable> {
        let table = self.start(group_by, pivot_columns);
        table.wait();
        table
    }

    /// Builds a pivot without waiting.
    pub fn start(&self, group_by: Vec<usize>, pivot_columns: Vec<usize>) -> Arc<PivotTable> {
        build_pivot(
            Arc::clone(&self.sheet),
            PivotDefinition::new(group_by, pivot_columns),
            Arc::clone(&self.registry),
        )
        .expect("valid pivot definition")
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub struct SalesFixture;

impl SalesFixture {
    pub fn headers() -> Vec<&'static str> {
        vec!["Region", "Product", "Quarter", "Sales", "Quantity"]
    }

    pub fn data() -> Vec<(&'static str, &'static str, &'static str, f64, i64)> {
        vec![
            ("North", "Widget", "Q1", 10000.0, 100),
            ("North", "Widget", "Q2", 12000.0, 120),
            ("North", "Gadget", "Q1", 8000.0, 80),
            ("North", "Gadget", "Q2", 9000.0, 90),
            ("South", "Widget", "Q1", 15000.0, 150),
            ("South", "Widget", "Q2", 14000.0, 140),
            ("South", "Gadget", "Q1", 11000.0, 110),
            ("South", "Gadget", "Q2", 13000.0, 130),
            ("East", "Widget", "Q1", 9000.0, 90),
            ("East", "Widget", "Q2", 11000.0, 110),
            ("East", "Gadget", "Q1", 7000.0, 70),
            ("East", "Gadget", "Q2", 8500.0, 85),
        ]
    }

    pub fn columns(sales_aggregators: &[&str]) -> Vec<Column> {
        let types = [
            ColumnType::Text,
            ColumnType::Text,
            ColumnType::Text,
            ColumnType::Float,
            ColumnType::Integer,
        ];
        Self::headers()
            .into_iter()
            .zip(types)
            .enumerate()
            .map(|(i, (name, col_type))| {
                let column = Column::new(name, i, col_type).with_width(10);
                if i == SALES {
                    column.with_aggregators(sales_aggregators)
                } else {
                    column
                }
            })
            .collect()
    }

    pub fn rows() -> Vec<Row> {
        Self::data()
            .into_iter()
            .map(|(region, product, quarter, sales, quantity)| {
                vec![
                    CellValue::text(region),
                    CellValue::text(product),
                    CellValue::text(quarter),
                    CellValue::Number(sales),
                    CellValue::Integer(quantity),
                ]
            })
            .collect()
    }

    pub fn sheet(options: SheetOptions, sales_aggregators: &[&str]) -> Sheet {
        Sheet::new("sales", Self::columns(sales_aggregators))
            .with_options(options)
            .with_rows(Self::rows())
    }
}

// ============================================================================
// ASSERTION HELPERS
// ============================================================================

/// Assert that a pivot cell holds an expected number.
pub fn assert_cell_number(table: &PivotTable, row: usize, col: usize, expected: f64) {
    match table.value(row, col) {
        Ok(PivotCellValue::Value(value)) => match value.as_f64() {
            Some(n) => assert!(
                (n - expected).abs() < 0.001,
                "Cell ({}, {}) expected {} but got {}",
                row, col, expected, n
            ),
            None => panic!("Cell ({}, {}) expected {} but got {:?}", row, col, expected, value),
        },
        other => panic!("Cell ({}, {}) expected {} but got {:?}", row, col, expected, other),
    }
}

/// Sorted union of all group rows' source rows.
pub fn all_source_rows(table: &PivotTable) -> Vec<usize> {
    let mut ids: Vec<usize> = table
        .rows()
        .iter()
        .flat_map(|r| r.source_rows.iter().copied())
        .collect();
    ids.sort_unstable();
    ids
}
