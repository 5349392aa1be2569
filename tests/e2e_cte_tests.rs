//! End-to-end CTE coverage: plain WITH and WITH RECURSIVE (§4.6/§6).

use mskql::{db_exec_sql, Database};

fn exec(db: &mut Database, sql: &str) -> mskql::Rows {
    db_exec_sql(db, sql).unwrap_or_else(|e| panic!("{sql}: {e}"))
}

#[test]
fn plain_cte_is_visible_to_outer_query() {
    let mut db = Database::new("test");
    exec(&mut db, "CREATE TABLE t (val INT)");
    exec(&mut db, "INSERT INTO t (val) VALUES (1), (2), (3)");
    let rows = exec(&mut db, "WITH doubled AS (SELECT val * 2 AS v FROM t) SELECT v FROM doubled ORDER BY v");
    let vals: Vec<i64> = rows.rows.iter().map(|r| r.cells[0].as_f64().unwrap() as i64).collect();
    assert_eq!(vals, vec![2, 4, 6]);
}

#[test]
fn recursive_cte_generates_a_sequence() {
    let mut db = Database::new("test");
    let rows = exec(
        &mut db,
        "WITH RECURSIVE counter(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM counter WHERE n < 5) SELECT n FROM counter ORDER BY n",
    );
    let vals: Vec<i64> = rows.rows.iter().map(|r| r.cells[0].as_f64().unwrap() as i64).collect();
    assert_eq!(vals, vec![1, 2, 3, 4, 5]);
}

#[test]
fn recursive_cte_walks_a_tree() {
    let mut db = Database::new("test");
    exec(&mut db, "CREATE TABLE nodes (id INT, parent_id INT)");
    exec(&mut db, "INSERT INTO nodes (id, parent_id) VALUES (1, NULL), (2, 1), (3, 1), (4, 2)");
    let rows = exec(
        &mut db,
        "WITH RECURSIVE descendants(id) AS (
            SELECT id FROM nodes WHERE id = 1
            UNION
            SELECT nodes.id FROM nodes JOIN descendants ON nodes.parent_id = descendants.id
        ) SELECT id FROM descendants ORDER BY id",
    );
    let vals: Vec<i64> = rows.rows.iter().map(|r| r.cells[0].as_f64().unwrap() as i64).collect();
    assert_eq!(vals, vec![1, 2, 3, 4]);
}
