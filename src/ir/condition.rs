//! Boolean condition tree for `WHERE` / `HAVING` / `ON` (§3 "Condition tree").

use crate::arena::IDX_NONE;
use crate::cell::Cell;

/// The comparison operators named in §3. `Any`/`All` pair with an array
/// literal or a subquery (`col = ANY(ARRAY[...])` / `col > ALL(sq)`);
/// `Exists`/`NotExists` ignore the left-hand column entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Between,
    Like,
    ILike,
    IsDistinctFrom,
    IsNotDistinctFrom,
    Exists,
    NotExists,
    Any,
    All,
}

/// A single `compare` condition node. Not every field applies to every
/// `op`; unused fields take their "absent" value (`IDX_NONE`, `None`,
/// empty `Vec`). This mirrors the reference's single wide struct per
/// condition rather than splitting into one variant per operator, which
/// would fragment the match arms in the evaluator for no benefit.
#[derive(Debug, Clone)]
pub struct Compare {
    /// Bare column name, used when `lhs_expr` is `IDX_NONE`.
    pub column: String,
    pub op: CmpOp,
    /// Index into `cells`; `IDX_NONE` when the RHS is not a single literal
    /// (subquery, IN-list, BETWEEN, EXISTS).
    pub literal: u32,
    /// Index into `cells`, the upper bound of a `BETWEEN ... AND ...`.
    pub between_high: u32,
    /// Index into `exprs`, when the LHS is an expression rather than a
    /// bare column reference (e.g. `length(name) > 3`).
    pub lhs_expr: u32,
    /// Index into `exprs`, when the RHS is itself a column/expression
    /// rather than a literal (`IDX_NONE` otherwise) — the shape a `JOIN ...
    /// ON a.x = b.y` condition takes, since the two sides name columns on
    /// different merged-row inputs rather than one side being a constant.
    pub rhs_expr: u32,
    /// Literal `IN (...)` values, when present.
    pub in_values: Vec<Cell>,
    /// Captured SQL text of `IN (SELECT ...)`, index into `strings`.
    pub in_subquery_sql: u32,
    /// Captured SQL text of a scalar subquery RHS, index into `strings`.
    pub scalar_subquery_sql: u32,
    /// Literal array for `ANY(ARRAY[...])` / `ALL(ARRAY[...])`.
    pub any_all_values: Vec<Cell>,
}

impl Compare {
    pub fn new(column: impl Into<String>, op: CmpOp) -> Self {
        Compare {
            column: column.into(),
            op,
            literal: IDX_NONE,
            between_high: IDX_NONE,
            lhs_expr: IDX_NONE,
            rhs_expr: IDX_NONE,
            in_values: Vec::new(),
            in_subquery_sql: IDX_NONE,
            scalar_subquery_sql: IDX_NONE,
            any_all_values: Vec::new(),
        }
    }

    /// A subquery-bearing node is one the dispatcher must resolve before
    /// execution (§4.6): `EXISTS`/`NOT EXISTS`, `IN`/`NOT IN (SELECT ...)`,
    /// or a scalar-subquery comparison.
    pub fn has_unresolved_subquery(&self) -> bool {
        self.op == CmpOp::Exists
            || self.op == CmpOp::NotExists
            || self.in_subquery_sql != IDX_NONE
            || self.scalar_subquery_sql != IDX_NONE
    }
}

/// Tagged union over boolean condition shapes (§3 "Condition tree"). Pooled
/// in `Arena::conditions`.
#[derive(Debug, Clone)]
pub enum Condition {
    Compare(Compare),
    /// Indices into `conditions`.
    And(u32, u32),
    Or(u32, u32),
    Not(u32),
    /// `(a, b) IN ((1, 2), (3, 4))`-style row-value IN: `columns` named
    /// left to right, `rows` one arena row per candidate tuple.
    MultiIn {
        columns: Vec<String>,
        /// Indices into `rows`.
        rows: Vec<u32>,
    },
    /// A resolved boolean constant. The dispatcher rewrites every
    /// `EXISTS`/`IN (SELECT ...)`/scalar-subquery `Compare` node to one of
    /// these once it has materialized and run the subquery text (§4.6) —
    /// evaluation never sees an unresolved subquery.
    Literal(bool),
}
