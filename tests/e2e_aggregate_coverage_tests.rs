//! End-to-end GROUP BY / aggregate / window function coverage (§4.10-4.11/§6).

use mskql::{db_exec_sql, Database};

fn exec(db: &mut Database, sql: &str) -> mskql::Rows {
    db_exec_sql(db, sql).unwrap_or_else(|e| panic!("{sql}: {e}"))
}

fn setup() -> Database {
    let mut db = Database::new("test");
    exec(&mut db, "CREATE TABLE sales (region TEXT, amount INT)");
    exec(
        &mut db,
        "INSERT INTO sales (region, amount) VALUES ('east', 10), ('east', 20), ('west', 5), ('west', 15), ('west', 25)",
    );
    db
}

#[test]
fn group_by_with_sum_and_count() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT region, SUM(amount), COUNT(*) FROM sales GROUP BY region ORDER BY region");
    assert_eq!(rows.rows.len(), 2);
    let east = &rows.rows[0];
    assert_eq!(east.cells[0].as_str(), Some("east"));
    assert_eq!(east.cells[1].as_f64(), Some(30.0));
    assert_eq!(east.cells[2].as_f64(), Some(2.0));
}

#[test]
fn having_filters_groups() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT region, SUM(amount) FROM sales GROUP BY region HAVING SUM(amount) > 40 ORDER BY region");
    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.rows[0].cells[0].as_str(), Some("west"));
}

#[test]
fn aggregate_without_group_by_collapses_to_one_row() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT COUNT(*), AVG(amount) FROM sales");
    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.rows[0].cells[0].as_f64(), Some(5.0));
}

#[test]
fn min_max_aggregates() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT MIN(amount), MAX(amount) FROM sales");
    assert_eq!(rows.rows[0].cells[0].as_f64(), Some(5.0));
    assert_eq!(rows.rows[0].cells[1].as_f64(), Some(25.0));
}

#[test]
fn row_number_window_orders_within_partition() {
    let mut db = setup();
    let rows = exec(
        &mut db,
        "SELECT region, amount, ROW_NUMBER() OVER (PARTITION BY region ORDER BY amount) FROM sales ORDER BY region, amount",
    );
    assert_eq!(rows.rows.len(), 5);
    let west_rows: Vec<_> = rows.rows.iter().filter(|r| r.cells[0].as_str() == Some("west")).collect();
    let ranks: Vec<i64> = west_rows.iter().map(|r| r.cells[2].as_f64().unwrap() as i64).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[test]
fn running_sum_window() {
    let mut db = setup();
    let rows = exec(
        &mut db,
        "SELECT region, amount, SUM(amount) OVER (PARTITION BY region ORDER BY amount) FROM sales ORDER BY region, amount",
    );
    let east_rows: Vec<_> = rows.rows.iter().filter(|r| r.cells[0].as_str() == Some("east")).collect();
    assert_eq!(east_rows[0].cells[2].as_f64(), Some(10.0));
    assert_eq!(east_rows[1].cells[2].as_f64(), Some(30.0));
}
