//! End-to-end join coverage: inner, left, right, full, cross (§4.8/§6).

use mskql::{db_exec_sql, Database};

fn exec(db: &mut Database, sql: &str) -> mskql::Rows {
    db_exec_sql(db, sql).unwrap_or_else(|e| panic!("{sql}: {e}"))
}

fn setup() -> Database {
    let mut db = Database::new("test");
    exec(&mut db, "CREATE TABLE customers (id INT, name TEXT)");
    exec(&mut db, "CREATE TABLE orders (id INT, customer_id INT, amount INT)");
    exec(&mut db, "INSERT INTO customers (id, name) VALUES (1, 'ann'), (2, 'bo'), (3, 'cy')");
    exec(&mut db, "INSERT INTO orders (id, customer_id, amount) VALUES (10, 1, 100), (11, 1, 50), (12, 2, 75)");
    db
}

#[test]
fn inner_join_excludes_unmatched() {
    let mut db = setup();
    let rows = exec(
        &mut db,
        "SELECT customers.name, orders.amount FROM customers JOIN orders ON customers.id = orders.customer_id",
    );
    assert_eq!(rows.rows.len(), 3);
    assert!(rows.rows.iter().all(|r| r.cells[0].as_str() != Some("cy")));
}

#[test]
fn left_join_keeps_unmatched_with_nulls() {
    let mut db = setup();
    let rows = exec(
        &mut db,
        "SELECT customers.name, orders.amount FROM customers LEFT JOIN orders ON customers.id = orders.customer_id ORDER BY customers.name",
    );
    assert_eq!(rows.rows.len(), 4);
    let cy_row = rows.rows.iter().find(|r| r.cells[0].as_str() == Some("cy")).unwrap();
    assert!(cy_row.cells[1].is_null());
}

#[test]
fn right_join_mirrors_left() {
    let mut db = setup();
    let rows = exec(
        &mut db,
        "SELECT customers.name, orders.amount FROM orders RIGHT JOIN customers ON customers.id = orders.customer_id",
    );
    assert_eq!(rows.rows.len(), 4);
}

#[test]
fn full_join_keeps_both_sides() {
    let mut db = setup();
    exec(&mut db, "INSERT INTO orders (id, customer_id, amount) VALUES (13, 99, 1)");
    let rows = exec(
        &mut db,
        "SELECT customers.name, orders.amount FROM customers FULL JOIN orders ON customers.id = orders.customer_id",
    );
    assert_eq!(rows.rows.len(), 5);
}

#[test]
fn cross_join_is_cartesian_product() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT * FROM customers CROSS JOIN orders");
    assert_eq!(rows.rows.len(), 3 * 3);
}
