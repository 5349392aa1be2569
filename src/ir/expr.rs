//! Scalar expression AST (§3 "Expression AST").

use crate::arena::IDX_NONE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

/// Built-in scalar functions named in §3. `Custom` is never produced by the
/// grammar in §6 (there are no UDFs, per §1's Non-goals) but keeps the enum
/// open for a function the planner recognizes without a dedicated variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Func {
    Coalesce,
    NullIf,
    Greatest,
    Least,
    Upper,
    Lower,
    Length,
    Trim,
    Substring,
}

/// One arm of a `CASE WHEN cond THEN result` expression.
#[derive(Debug, Clone, Copy)]
pub struct CaseWhenBranch {
    /// Index into `conditions`.
    pub cond: u32,
    /// Index into `exprs`.
    pub result: u32,
}

/// Tagged union over every expression shape (§3 "Expression AST"). Pooled in
/// `Arena::exprs`; cross-references are indices into sibling pools.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Index into `cells`.
    Literal(u32),

    /// A bare column reference, optionally table/alias-qualified
    /// (`alias.col`). Stored as an owned name rather than an `sv` slice
    /// since column references routinely get rewritten with a qualifying
    /// alias during join planning (§4.8).
    ColumnRef(String),

    BinaryOp {
        op: BinOp,
        lhs: u32,
        rhs: u32,
    },

    UnaryOp {
        op: UnaryOp,
        operand: u32,
    },

    FuncCall {
        func: Func,
        /// `(start, count)` range into `arg_indices`, each entry an index
        /// into `exprs`.
        args_start: u32,
        args_count: u32,
    },

    /// `branches_start/count` range into `branches`; `else_expr` is
    /// `IDX_NONE` when there is no `ELSE`.
    CaseWhen {
        branches_start: u32,
        branches_count: u32,
        else_expr: u32,
    },

    /// A scalar subquery used in expression position. `sql` indexes into
    /// `strings`: the captured substring of the original statement text
    /// (§9 "Ownership of SQL-text fragments").
    Subquery {
        sql: u32,
    },
}

impl Expr {
    pub fn case_when(branches_start: u32, branches_count: u32) -> Self {
        Expr::CaseWhen { branches_start, branches_count, else_expr: IDX_NONE }
    }
}
