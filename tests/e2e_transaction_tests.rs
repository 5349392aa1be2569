//! End-to-end BEGIN/COMMIT/ROLLBACK coverage over snapshot-based
//! transactions (§4.7/§6).

use mskql::{db_exec_sql, Database};

fn exec(db: &mut Database, sql: &str) -> mskql::Rows {
    db_exec_sql(db, sql).unwrap_or_else(|e| panic!("{sql}: {e}"))
}

fn count(db: &mut Database, table: &str) -> i64 {
    exec(db, &format!("SELECT COUNT(*) FROM {table}")).rows[0].cells[0].as_f64().unwrap() as i64
}

#[test]
fn rollback_undoes_inserts() {
    let mut db = Database::new("test");
    exec(&mut db, "CREATE TABLE t (val INT)");
    exec(&mut db, "BEGIN");
    exec(&mut db, "INSERT INTO t (val) VALUES (1), (2)");
    assert_eq!(count(&mut db, "t"), 2);
    exec(&mut db, "ROLLBACK");
    assert_eq!(count(&mut db, "t"), 0);
}

#[test]
fn commit_persists_changes() {
    let mut db = Database::new("test");
    exec(&mut db, "CREATE TABLE t (val INT)");
    exec(&mut db, "BEGIN");
    exec(&mut db, "INSERT INTO t (val) VALUES (1)");
    exec(&mut db, "COMMIT");
    assert_eq!(count(&mut db, "t"), 1);
}

#[test]
fn rollback_restores_updates_and_deletes() {
    let mut db = Database::new("test");
    exec(&mut db, "CREATE TABLE t (id INT, val TEXT)");
    exec(&mut db, "INSERT INTO t (id, val) VALUES (1, 'a'), (2, 'b')");
    exec(&mut db, "BEGIN");
    exec(&mut db, "UPDATE t SET val = 'z' WHERE id = 1");
    exec(&mut db, "DELETE FROM t WHERE id = 2");
    exec(&mut db, "ROLLBACK");
    let rows = exec(&mut db, "SELECT id, val FROM t ORDER BY id");
    assert_eq!(rows.rows.len(), 2);
    assert_eq!(rows.rows[0].cells[1].as_str(), Some("a"));
}

#[test]
fn ddl_inside_transaction_rolls_back() {
    let mut db = Database::new("test");
    exec(&mut db, "BEGIN");
    exec(&mut db, "CREATE TABLE scratch (val INT)");
    exec(&mut db, "ROLLBACK");
    let err = db_exec_sql(&mut db, "SELECT * FROM scratch").unwrap_err();
    assert!(err.to_string().to_lowercase().contains("scratch"));
}
