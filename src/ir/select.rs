//! Clause-level IR shared by `SELECT`, `INSERT ... SELECT`, set operations,
//! and DML `RETURNING` (§3, §6).

use crate::arena::IDX_NONE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// One `JOIN` clause (§4.8). `on` is `IDX_NONE` when the join was spelled
/// with `USING` or `NATURAL` instead of an explicit `ON` condition.
#[derive(Debug, Clone)]
pub struct JoinInfo {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub natural: bool,
    pub using: Vec<String>,
    /// Index into `conditions`.
    pub on: u32,
    /// `LATERAL (SELECT ...)`: captured SQL text, index into `strings`.
    /// Re-parsed and re-executed once per outer row (§4.8, §9).
    pub lateral_sql: Option<u32>,
}

impl JoinInfo {
    pub fn new(join_type: JoinType, table: impl Into<String>) -> Self {
        JoinInfo {
            join_type,
            table: table.into(),
            alias: None,
            natural: false,
            using: Vec::new(),
            on: IDX_NONE,
            lateral_sql: None,
        }
    }
}

/// `WITH [RECURSIVE] name [(cols)] AS (sql)`.
#[derive(Debug, Clone)]
pub struct CteDef {
    pub name: String,
    pub recursive: bool,
    pub column_names: Vec<String>,
    /// Captured SQL text of the CTE body, index into `strings`.
    pub sql: u32,
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    /// Column name, or a `SELECT`-list alias resolved against the raw
    /// text per §4.13.
    pub column: String,
    pub desc: bool,
    /// `None` ⇒ default (NULLs last for ASC, first for DESC; §4.12).
    pub nulls_first: Option<bool>,
}

/// One item of a comma-separated `SET` list in `UPDATE`.
#[derive(Debug, Clone)]
pub struct SetClause {
    pub column: String,
    /// Index into `exprs`.
    pub expr: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    /// The column name an aggregate select-list entry takes when no
    /// explicit alias was given (§4.9, §4.14's synthetic HAVING schema).
    pub fn default_name(self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
        }
    }
}

/// `COUNT(*)` has no argument; every other aggregate's argument is an
/// expression index.
#[derive(Debug, Clone)]
pub struct AggExpr {
    pub func: AggFunc,
    /// Index into `exprs`; `IDX_NONE` only for `COUNT(*)`.
    pub arg: u32,
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    Ntile,
    PercentRank,
    CumeDist,
    Lag,
    Lead,
    FirstValue,
    LastValue,
    NthValue,
    Sum,
    Count,
    Avg,
}

impl WindowFunc {
    /// The column name a window select-list entry takes when no explicit
    /// alias was given (§4.9, §4.12).
    pub fn default_name(self) -> &'static str {
        match self {
            WindowFunc::RowNumber => "row_number",
            WindowFunc::Rank => "rank",
            WindowFunc::DenseRank => "dense_rank",
            WindowFunc::Ntile => "ntile",
            WindowFunc::PercentRank => "percent_rank",
            WindowFunc::CumeDist => "cume_dist",
            WindowFunc::Lag => "lag",
            WindowFunc::Lead => "lead",
            WindowFunc::FirstValue => "first_value",
            WindowFunc::LastValue => "last_value",
            WindowFunc::NthValue => "nth_value",
            WindowFunc::Sum => "sum",
            WindowFunc::Count => "count",
            WindowFunc::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u32),
    CurrentRow,
    Following(u32),
    UnboundedFollowing,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowFrame {
    pub start: FrameBound,
    pub end: FrameBound,
}

/// One `fn(...) OVER (...)` window expression (§4.12).
#[derive(Debug, Clone)]
pub struct WindowExpr {
    pub func: WindowFunc,
    /// Index into `exprs`; absent for `ROW_NUMBER`/`RANK`/`DENSE_RANK`.
    pub arg: u32,
    pub partition_by: Vec<String>,
    pub order_by: Vec<OrderByItem>,
    pub frame: Option<WindowFrame>,
    /// `NTILE(n)` bucket count, `NTH_VALUE(expr, n)` position, or
    /// `LAG`/`LEAD` offset (default 1 when absent).
    pub extra_arg: Option<i64>,
    /// `LAG`/`LEAD` default value expression.
    pub default_expr: u32,
}

impl WindowExpr {
    pub fn new(func: WindowFunc) -> Self {
        WindowExpr {
            func,
            arg: IDX_NONE,
            partition_by: Vec::new(),
            order_by: Vec::new(),
            frame: None,
            extra_arg: None,
            default_expr: IDX_NONE,
        }
    }
}

/// One item of the top-level `SELECT` column list.
#[derive(Debug, Clone)]
pub enum SelectColumn {
    /// `*` or `alias.*`.
    Star { table_alias: Option<String> },
    ColumnRef {
        table_alias: Option<String>,
        name: String,
        alias: Option<String>,
    },
    /// Index into `select_exprs`.
    Expr {
        select_expr: u32,
        alias: Option<String>,
    },
    /// Index into `aggregates`.
    Aggregate {
        agg: u32,
        alias: Option<String>,
    },
    /// Index into `window_exprs`.
    Window {
        window: u32,
        alias: Option<String>,
    },
}

/// A general projected expression referenced by `SelectColumn::Expr` and by
/// `expr_project`'s argument list (§4.12).
#[derive(Debug, Clone, Copy)]
pub struct SelectExpr {
    /// Index into `exprs`.
    pub expr: u32,
}
