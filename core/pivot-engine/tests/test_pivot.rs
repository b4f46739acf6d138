//! FILENAME: tests/test_pivot.rs
//! Integration tests for building, reading and editing pivot tables.

mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::{
    all_source_rows, assert_cell_number, SalesFixture, TestHarness, PRODUCT, QUANTITY, QUARTER,
    REGION, SALES,
};
use engine::{CellValue, Column, ColumnType, Sheet, SheetOptions};
use pivot_engine::{
    build_pivot, AggregatorRegistry, Bin, BinningMode, NumericKey, PivotCellValue,
    PivotDefinition, PivotError, IN_PROGRESS_TEXT,
};

// ============================================================================
// GROUPING
// ============================================================================

#[test]
fn test_every_source_row_lands_in_exactly_one_group() {
    let harness = TestHarness::new();
    let table = harness.pivot(vec![REGION], vec![PRODUCT]);

    assert_eq!(table.row_count(), 3);
    assert_eq!(all_source_rows(&table), (0..12).collect::<Vec<_>>());
}

#[test]
fn test_pivot_rows_partition_each_group() {
    let harness = TestHarness::new();
    let table = harness.pivot(vec![REGION], vec![PRODUCT, QUARTER]);

    for row in table.rows().iter() {
        // Two pivot columns: every source row is listed once under each.
        let listed: usize = row.pivot_rows.values().map(Vec::len).sum();
        assert_eq!(listed, row.source_rows.len() * 2);
    }
}

#[test]
fn test_groups_follow_first_seen_order() {
    let harness = TestHarness::new();
    let table = harness.pivot(vec![REGION, QUARTER], vec![]);

    let keys: Vec<String> = (0..table.row_count())
        .map(|r| format!("{}/{}", table.display(r, 0).unwrap(), table.display(r, 1).unwrap()))
        .collect();
    assert_eq!(
        keys,
        vec!["North/Q1", "North/Q2", "South/Q1", "South/Q2", "East/Q1", "East/Q2"]
    );
}

#[test]
fn test_two_binned_columns_are_a_configuration_error() {
    let harness = TestHarness::with_binning(0);
    let result = build_pivot(
        Arc::clone(&harness.sheet),
        PivotDefinition::new(vec![SALES, QUANTITY], vec![]),
        Arc::clone(&harness.registry),
    );
    assert_eq!(
        result.unwrap_err(),
        PivotError::MultipleNumericColumns(vec!["Sales".to_string(), "Quantity".to_string()])
    );
}

// ============================================================================
// BINNING
// ============================================================================

#[test]
fn test_numeric_group_by_is_binned() {
    let harness = TestHarness::with_binning(4);
    let table = harness.pivot(vec![QUANTITY], vec![]);

    let binning = table.binning().unwrap();
    assert_eq!(binning.mode, BinningMode::EqualWidth);
    assert_eq!(binning.width, 20.0);

    assert_eq!(table.row_count(), 4);
    let sizes: Vec<usize> = table.rows().iter().map(|r| r.len()).collect();
    assert_eq!(sizes, vec![3, 3, 3, 3]);

    assert_eq!(table.display(0, 0).unwrap(), "70 - 90");
    // The maximum value belongs to the last bin.
    assert_eq!(table.display(3, 0).unwrap(), "130 - 150");
    assert_eq!(table.columns()[0].column.width, Some(20));
}

#[test]
fn test_default_bin_count_from_row_count() {
    let harness = TestHarness::with_binning(0);
    let table = harness.pivot(vec![QUANTITY], vec![]);
    // round(sqrt(12)) bins
    assert_eq!(table.binning().unwrap().bin_count(), 3);
    assert_eq!(table.row_count(), 3);
}

#[test]
fn test_empty_bins_are_still_rows() {
    let harness = TestHarness::with_binning(4);
    let table = harness.pivot(vec![REGION, QUANTITY], vec![]);

    // Four bins per region, whether or not the region has values there.
    assert_eq!(table.row_count(), 12);
    let north: Vec<usize> = table.rows()[..4].iter().map(|r| r.len()).collect();
    assert_eq!(north, vec![1, 2, 1, 0]);
}

#[test]
fn test_date_column_with_few_days_bins_per_day() {
    let day = |d: u32| CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, d).unwrap());
    let sheet = Sheet::new(
        "visits",
        vec![
            Column::new("Day", 0, ColumnType::Date),
            Column::new("Site", 1, ColumnType::Text),
        ],
    )
    .with_options(SheetOptions {
        numeric_binning: true,
        histogram_bins: 10,
    })
    .with_rows(vec![
        vec![day(1), CellValue::text("a")],
        vec![day(2), CellValue::text("a")],
        vec![day(2), CellValue::text("b")],
        vec![day(5), CellValue::text("a")],
    ]);
    let harness = TestHarness::with_sheet(sheet);
    let table = harness.pivot(vec![0], vec![1]);

    assert_eq!(table.binning().unwrap().mode, BinningMode::Degenerate);
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.display(1, 0).unwrap(), "2024-01-02");
    assert_eq!(table.value(1, 1).unwrap(), PivotCellValue::Value(CellValue::Integer(1)));
    assert_eq!(table.value(1, 2).unwrap(), PivotCellValue::Value(CellValue::Integer(1)));
}

// ============================================================================
// ERROR GROUPS
// ============================================================================

fn sheet_with_bad_quantities() -> Sheet {
    let mut rows = SalesFixture::rows();
    rows[1][QUANTITY] = CellValue::text("n/a");
    rows[2][QUANTITY] = CellValue::text("n/a");
    Sheet::new("sales", SalesFixture::columns(&["count"]))
        .with_options(SheetOptions {
            numeric_binning: true,
            histogram_bins: 4,
        })
        .with_rows(rows)
}

#[test]
fn test_unbinnable_rows_are_counted_in_an_error_group() {
    let harness = TestHarness::with_sheet(sheet_with_bad_quantities());
    let table = harness.pivot(vec![REGION, QUANTITY], vec![]);

    // Region, Quantity, Sales_count
    assert_eq!(table.column_count(), 3);
    assert_eq!(table.columns()[2].name(), "Sales_count");

    let error_rows: Vec<usize> = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.numeric_key.is_error())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(error_rows.len(), 1);

    let err = error_rows[0];
    assert_eq!(table.display(err, 0).unwrap(), "North");
    assert_eq!(table.display(err, 1).unwrap(), "#ERR");
    assert_eq!(table.value(err, 2).unwrap(), PivotCellValue::Value(CellValue::Integer(2)));

    let faults = table.faults();
    assert_eq!(faults.len(), 2);
    assert_eq!(faults[0].row, 1);
    assert_eq!(faults[0].column, "Quantity");

    // Nothing is lost: every row is counted exactly once.
    let total: i64 = (0..table.row_count())
        .map(|r| match table.value(r, 2).unwrap() {
            PivotCellValue::Value(CellValue::Integer(n)) => n,
            other => panic!("unexpected {:?}", other),
        })
        .sum();
    assert_eq!(total, 12);
}

#[test]
fn test_different_failures_get_different_error_groups() {
    let sheet = sheet_with_bad_quantities();
    sheet.set_values(QUANTITY, &[2], &CellValue::text("lots")).unwrap();
    let harness = TestHarness::with_sheet(sheet);
    let table = harness.pivot(vec![REGION, QUANTITY], vec![]);

    let errors = table.rows().iter().filter(|r| r.numeric_key.is_error()).count();
    assert_eq!(errors, 2);
}

#[test]
fn test_error_group_is_created_lazily() {
    let harness = TestHarness::with_binning(4);
    let table = harness.pivot(vec![REGION, QUANTITY], vec![]);
    assert!(table.rows().iter().all(|r| !r.numeric_key.is_error()));
    assert!(table.faults().is_empty());
}

// ============================================================================
// AGGREGATES
// ============================================================================

#[test]
fn test_pivoted_sum() {
    let harness = TestHarness::with_sheet(SalesFixture::sheet(SheetOptions::default(), &["sum"]));
    let table = harness.pivot(vec![REGION], vec![PRODUCT]);

    assert_eq!(table.name(), "sales_pivot_Product_sum");
    let names: Vec<String> = table.columns().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(names, vec!["Region", "Widget", "Gadget"]);

    assert_cell_number(&table, 0, 1, 22000.0);
    assert_cell_number(&table, 0, 2, 17000.0);
    assert_cell_number(&table, 1, 1, 29000.0);
    assert_cell_number(&table, 2, 2, 15500.0);
}

#[test]
fn test_rebuilding_gives_the_same_table() {
    let harness = TestHarness::with_sheet(SalesFixture::sheet(
        SheetOptions {
            numeric_binning: true,
            histogram_bins: 0,
        },
        &["sum", "avg"],
    ));
    let first = harness.pivot(vec![REGION, QUANTITY], vec![PRODUCT]);
    let second = harness.pivot(vec![REGION, QUANTITY], vec![PRODUCT]);

    assert_eq!(first.row_count(), second.row_count());
    assert_eq!(first.binning(), second.binning());
    assert_eq!(first.column_count(), second.column_count());
    for r in 0..first.row_count() {
        for c in 0..first.column_count() {
            assert_eq!(first.value(r, c).unwrap(), second.value(r, c).unwrap());
        }
    }
}

#[test]
fn test_add_aggregate_columns_after_origin() {
    let harness = TestHarness::with_sheet(SalesFixture::sheet(SheetOptions::default(), &["sum", "count"]));
    let table = harness.pivot(vec![REGION], vec![]);

    let added = table.add_aggregate_columns(1, &["summary"]).unwrap();
    assert_eq!(added, 3);

    let names: Vec<String> = table.columns().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(
        names,
        vec!["Region", "Sales_sum", "Sales_min", "Sales_max", "Sales_avg", "Sales_count"]
    );
    assert_cell_number(&table, 0, 1, 39000.0);
    assert_cell_number(&table, 0, 2, 8000.0);
    assert_cell_number(&table, 0, 3, 12000.0);
    assert_cell_number(&table, 0, 4, 9750.0);
    assert_cell_number(&table, 0, 5, 4.0);
    assert!(table.columns()[2].is_cached());
}

#[test]
fn test_add_aggregate_columns_rejects_key_columns_and_unknown_choices() {
    let harness = TestHarness::with_sheet(SalesFixture::sheet(SheetOptions::default(), &["sum"]));
    let table = harness.pivot(vec![REGION], vec![]);

    assert_eq!(
        table.add_aggregate_columns(0, &["max"]),
        Err(PivotError::NotAggregateColumn("Region".to_string()))
    );
    assert_eq!(
        table.add_aggregate_columns(1, &["mode"]),
        Err(PivotError::UnknownAggregator("mode".to_string()))
    );
    assert_eq!(table.column_count(), 2);
}

// ============================================================================
// DRILL-DOWN
// ============================================================================

#[test]
fn test_open_row_and_cell() {
    let harness = TestHarness::new();
    let table = harness.pivot(vec![REGION, QUARTER], vec![PRODUCT]);

    let row = table.open_row(0).unwrap();
    assert_eq!(row.name, "sales_North+Q1");
    assert_eq!(row.row_ids, vec![0, 2]);

    let gadget = table.column_by_name("Gadget").unwrap();
    let cell = table.open_cell(0, gadget).unwrap();
    assert_eq!(cell.name, "sales_Gadget");
    assert_eq!(cell.row_ids, vec![2]);
    assert_eq!(cell.materialize()[0][SALES], CellValue::Number(8000.0));
}

// ============================================================================
// KEY EDITS
// ============================================================================

#[test]
fn test_key_edit_writes_through_to_source() {
    let harness = TestHarness::new();
    let table = harness.pivot(vec![REGION], vec![PRODUCT]);

    table.set_key(0, 0, CellValue::text("Nord")).unwrap();

    assert_eq!(table.display(0, 0).unwrap(), "Nord");
    assert_eq!(table.rows()[0].source_rows, vec![0, 1, 2, 3]);
    let rows = harness.sheet.rows();
    assert!(rows[..4].iter().all(|r| r[REGION] == CellValue::text("Nord")));
    assert_eq!(rows[4][REGION], CellValue::text("South"));
}

#[test]
fn test_key_edit_recomputes_cached_aggregates() {
    let harness = TestHarness::with_sheet(SalesFixture::sheet(SheetOptions::default(), &["sum"]));
    let table = harness.pivot(vec![REGION], vec![]);
    assert_eq!(harness.sheet.column_by_name("Sales"), Some(SALES));

    assert_cell_number(&table, 0, 1, 39000.0);
    assert!(table.columns()[1].is_cached());

    // A direct source edit is not seen through the memoized value.
    harness
        .sheet
        .set_values(SALES, &[0], &CellValue::Number(20000.0))
        .unwrap();
    assert_cell_number(&table, 0, 1, 39000.0);

    table.set_key(0, 0, CellValue::text("Nord")).unwrap();
    assert_cell_number(&table, 0, 1, 49000.0);
}

#[test]
fn test_range_key_is_read_only() {
    let harness = TestHarness::with_binning(4);
    let table = harness.pivot(vec![QUANTITY], vec![]);
    assert_eq!(
        table.set_key(0, 0, CellValue::Integer(1)),
        Err(PivotError::NotEditable("Quantity".to_string()))
    );
    assert_eq!(table.rows()[0].numeric_key, NumericKey::Range(Bin::new(70.0, 90.0)));
}

// ============================================================================
// LOADING
// ============================================================================

fn large_sheet(rows: usize) -> Sheet {
    let regions = ["North", "South", "East", "West"];
    let sheet = Sheet::new("big", SalesFixture::columns(&["sum"]));
    for i in 0..rows {
        sheet.push_row(vec![
            CellValue::text(regions[i % regions.len()]),
            CellValue::text(format!("P{}", i % 50)),
            CellValue::text("Q1"),
            CellValue::Number(i as f64),
            CellValue::Integer((i % 97) as i64),
        ]);
    }
    sheet
}

#[test]
fn test_key_columns_exist_before_load_finishes() {
    let harness = TestHarness::with_sheet(large_sheet(50_000));
    let table = harness.start(vec![REGION], vec![PRODUCT]);

    assert_eq!(table.columns()[0].name(), "Region");
    table.wait();
    assert!(!table.is_loading());
    assert_eq!(table.row_count(), 4);
    assert_eq!(table.column_count(), 51);
}

#[test]
fn test_aggregates_read_in_progress_while_loading() {
    let harness = TestHarness::with_sheet(large_sheet(400_000));
    let table = harness.start(vec![REGION], vec![PRODUCT]);

    let mut seen_in_progress = false;
    while table.is_loading() {
        if table.row_count() > 0 && table.column_count() > 1 {
            let value = table.value(0, 1).unwrap();
            let key = table.display(0, 0).unwrap();
            // `loading` only ever goes from true to false, so the read above
            // happened mid-load if the flag is still set now.
            if table.is_loading() {
                assert!(value.is_in_progress(), "expected in-progress, got {:?}", value);
                assert_eq!(table.column(1).unwrap().display(&value), IN_PROGRESS_TEXT);
                assert_eq!(key, "North");
                seen_in_progress = true;
                break;
            }
        }
        std::thread::yield_now();
    }
    assert!(seen_in_progress, "load finished before any row was visible");

    table.wait();
    assert_eq!(table.row_count(), 4);
    assert!(!table.value(0, 1).unwrap().is_in_progress());
}

#[test]
fn test_cancel_keeps_partial_results() {
    let harness = TestHarness::with_sheet(large_sheet(200_000));
    let table = harness.start(vec![REGION], vec![PRODUCT]);
    table.cancel();
    table.wait();

    assert!(!table.is_loading());
    assert!(table.is_cancelled());

    // Whatever was grouped is consistent: no row appears twice.
    let ids = all_source_rows(&table);
    let mut deduped = ids.clone();
    deduped.dedup();
    assert_eq!(ids, deduped);
    assert!(ids.len() <= 200_000);

    // Aggregates are readable once loading is over.
    for r in 0..table.row_count() {
        for c in 0..table.column_count() {
            assert!(!table.value(r, c).unwrap().is_in_progress());
        }
    }
}

#[test]
fn test_registry_is_shared_between_tables() {
    let harness = TestHarness::new();
    let registry = Arc::new(AggregatorRegistry::new());
    let a = build_pivot(
        Arc::clone(&harness.sheet),
        PivotDefinition::new(vec![REGION], vec![PRODUCT]),
        Arc::clone(&registry),
    )
    .unwrap();
    let b = build_pivot(
        Arc::clone(&harness.sheet),
        PivotDefinition::new(vec![PRODUCT], vec![REGION]),
        Arc::clone(&registry),
    )
    .unwrap();
    a.wait();
    b.wait();
    assert_eq!(a.row_count(), 3);
    assert_eq!(b.row_count(), 2);
}
