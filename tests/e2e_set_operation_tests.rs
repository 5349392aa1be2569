//! End-to-end UNION / INTERSECT / EXCEPT coverage, including trailing
//! ORDER BY/LIMIT on a set-op chain (§4.9/§6).

use mskql::{db_exec_sql, Database};

fn exec(db: &mut Database, sql: &str) -> mskql::Rows {
    db_exec_sql(db, sql).unwrap_or_else(|e| panic!("{sql}: {e}"))
}

fn setup() -> Database {
    let mut db = Database::new("test");
    exec(&mut db, "CREATE TABLE a (val INT)");
    exec(&mut db, "CREATE TABLE b (val INT)");
    exec(&mut db, "INSERT INTO a (val) VALUES (1), (2), (3)");
    exec(&mut db, "INSERT INTO b (val) VALUES (2), (3), (4)");
    db
}

fn vals(rows: &mskql::Rows) -> Vec<i64> {
    rows.rows.iter().map(|r| r.cells[0].as_f64().unwrap() as i64).collect()
}

#[test]
fn union_dedupes() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT val FROM a UNION SELECT val FROM b ORDER BY val");
    assert_eq!(vals(&rows), vec![1, 2, 3, 4]);
}

#[test]
fn union_all_keeps_duplicates() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT val FROM a UNION ALL SELECT val FROM b ORDER BY val");
    assert_eq!(rows.rows.len(), 6);
}

#[test]
fn intersect_keeps_common_rows() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT val FROM a INTERSECT SELECT val FROM b ORDER BY val");
    assert_eq!(vals(&rows), vec![2, 3]);
}

#[test]
fn except_removes_matching_rows() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT val FROM a EXCEPT SELECT val FROM b ORDER BY val");
    assert_eq!(vals(&rows), vec![1]);
}

#[test]
fn trailing_limit_applies_to_combined_result() {
    let mut db = setup();
    let rows = exec(&mut db, "SELECT val FROM a UNION SELECT val FROM b ORDER BY val LIMIT 2");
    assert_eq!(vals(&rows), vec![1, 2]);
}

#[test]
fn three_way_union_chain() {
    let mut db = setup();
    exec(&mut db, "CREATE TABLE c (val INT)");
    exec(&mut db, "INSERT INTO c (val) VALUES (5)");
    let rows = exec(&mut db, "SELECT val FROM a UNION SELECT val FROM b UNION SELECT val FROM c ORDER BY val");
    assert_eq!(vals(&rows), vec![1, 2, 3, 4, 5]);
}
