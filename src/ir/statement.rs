//! Top-level statement tree (§6). Unlike the nodes in [`super::expr`] and
//! [`super::condition`], [`Query`] is not arena-pooled: it is the root
//! object the parser hands to the dispatcher, built once and walked
//! top-down, so ordinary `Box` children are the right tool (nothing else
//! ever needs to reference a `Query` node by index).

use crate::arena::{Arena, IDX_NONE};
use crate::cell::CellType;
use crate::ir::select::{AggExpr, SelectColumn, WindowExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

/// A `SELECT` statement body, with or without a surrounding set operation
/// attached by the caller (§3 "Plan node", §4.12 planner shape 4).
#[derive(Debug, Clone)]
pub struct QuerySelect {
    pub distinct: bool,
    /// Indices into `select_cols`.
    pub columns: Vec<u32>,
    pub from_table: Option<String>,
    pub from_alias: Option<String>,
    /// `FROM (SELECT ...) AS alias`: captured SQL text, index into
    /// `strings`; materialized into a temporary table before planning
    /// (§4.5, §4.14 step 2).
    pub from_subquery_sql: Option<u32>,
    /// `FROM generate_series(start, stop[, step])` (planner shape 1):
    /// literal-only bounds, parsed straight into the tuple rather than
    /// captured as SQL text since the executor's `generate_series` already
    /// takes plain `i64`s.
    pub generate_series: Option<(i64, i64, i64)>,
    /// Indices into `joins`.
    pub joins: Vec<u32>,
    /// Index into `conditions`.
    pub where_cond: u32,
    pub group_by: Vec<String>,
    /// Index into `conditions`.
    pub having: u32,
    /// Indices into `order_items`.
    pub order_by: Vec<u32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Indices into `ctes`, attached only at the outermost `Query::Select`
    /// of a statement that opened with `WITH`.
    pub ctes: Vec<u32>,
}

impl QuerySelect {
    pub fn new() -> Self {
        QuerySelect {
            distinct: false,
            columns: Vec::new(),
            from_table: None,
            from_alias: None,
            from_subquery_sql: None,
            generate_series: None,
            joins: Vec::new(),
            where_cond: IDX_NONE,
            group_by: Vec::new(),
            having: IDX_NONE,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            ctes: Vec::new(),
        }
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    /// Every `Aggregate` entry of the `SELECT` list, in select-list order,
    /// with its resolved output name — shared by the legacy executor's
    /// grouped stage and the planner's shape-5 (`HASH_AGG`) builder so
    /// both routes agree on aggregate naming (§4.9, §4.12).
    pub fn collect_aggregates(&self, arena: &Arena) -> Vec<CollectedAgg> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, &col_idx)| match arena.select_cols.get(col_idx) {
                SelectColumn::Aggregate { agg, alias } => {
                    let a = arena.aggregates.get(*agg).clone();
                    let name = alias.clone().unwrap_or_else(|| a.func.default_name().to_string());
                    Some(CollectedAgg { select_col_idx: i, agg: a, name })
                }
                _ => None,
            })
            .collect()
    }

    /// Every `Window` entry of the `SELECT` list, analogous to
    /// [`Self::collect_aggregates`] (§4.9, §4.12 shape 3).
    pub fn collect_windows(&self, arena: &Arena) -> Vec<CollectedWindow> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, &col_idx)| match arena.select_cols.get(col_idx) {
                SelectColumn::Window { window, alias } => {
                    let w = arena.window_exprs.get(*window).clone();
                    let name = alias.clone().unwrap_or_else(|| w.func.default_name().to_string());
                    Some(CollectedWindow { select_col_idx: i, window: w, name })
                }
                _ => None,
            })
            .collect()
    }
}

/// One resolved `Aggregate` select-list entry (§4.9).
pub struct CollectedAgg {
    pub select_col_idx: usize,
    pub agg: AggExpr,
    pub name: String,
}

/// One resolved `Window` select-list entry (§4.9).
pub struct CollectedWindow {
    pub select_col_idx: usize,
    pub window: WindowExpr,
    pub name: String,
}

impl Default for QuerySelect {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub enum InsertSource {
    /// One row per outer `Vec`, one expression index (into `exprs`) per
    /// cell.
    Values(Vec<Vec<u32>>),
    Select(Box<Query>),
}

#[derive(Debug, Clone)]
pub struct InsertStmt {
    pub table: String,
    pub columns: Vec<String>,
    pub source: InsertSource,
    /// `ON CONFLICT (cols) DO NOTHING`; `None` when absent.
    pub on_conflict_do_nothing: Option<Vec<String>>,
    /// Indices into `select_cols`; empty when there is no `RETURNING`.
    pub returning: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct UpdateStmt {
    pub table: String,
    /// Indices into `set_clauses`.
    pub set: Vec<u32>,
    /// `UPDATE t SET ... FROM other` (§4.14).
    pub from_table: Option<String>,
    pub from_alias: Option<String>,
    /// Index into `conditions`.
    pub where_cond: u32,
    pub returning: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct DeleteStmt {
    pub table: String,
    pub where_cond: u32,
    pub returning: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub ty: CellType,
    pub enum_type_name: Option<String>,
    pub not_null: bool,
    pub unique: bool,
    pub primary_key: bool,
    /// Index into `exprs`; `IDX_NONE` when there is no `DEFAULT`.
    pub default: u32,
    /// `SERIAL`/`BIGSERIAL`: §B.1 of the expanded design. The column's
    /// declared type is `Int`/`BigInt`; this flag tells `CREATE TABLE`
    /// to allocate a backing sequence and wire it as the implicit
    /// default.
    pub is_serial: bool,
    /// `CHECK (...)`: parsed and retained for `\d`-style introspection
    /// but never evaluated (§6 — parsed and ignored).
    pub check_sql: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone)]
pub enum AlterAction {
    AddColumn(ColumnDef),
    DropColumn(String),
    RenameColumn { old: String, new: String },
    AlterType { column: String, new_type: CellType },
}

/// Every statement shape in §6's grammar.
#[derive(Debug, Clone)]
pub enum Query {
    Select(QuerySelect),
    SetOp {
        op: SetOpKind,
        all: bool,
        lhs: Box<Query>,
        rhs: Box<Query>,
    },
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateTable(CreateTableStmt),
    DropTable { name: String },
    CreateIndex { name: String, table: String, columns: Vec<String>, unique: bool },
    DropIndex { name: String },
    CreateType { name: String, values: Vec<String> },
    DropType { name: String },
    AlterTable { table: String, action: AlterAction },
    Begin,
    Commit,
    Rollback,
}
