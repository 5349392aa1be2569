//! Crate-wide error type.
//!
//! All fallible operations in the engine return `Result<T, MskqlError>`.
//! Errors are classified the way the wire boundary needs them (§7):
//! a SQLSTATE code plus a human message. `NotFound` and `Constraint`
//! carry structured fields so callers (the dispatcher, tests) can match
//! on *what* was missing or violated without parsing the message text.

use std::fmt;

/// Primary error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum MskqlError {
    /// The parser rejected the statement, or it uses syntax not in §6's grammar.
    #[error("syntax error or unsupported statement: {0}")]
    Syntax(String),

    /// A semantic failure during planning or execution: type mismatch,
    /// join resolution failure, division by zero, etc.
    #[error("{0}")]
    Execution(String),

    /// A named catalog object could not be found.
    #[error("{kind} not found: {name}")]
    NotFound { kind: NotFoundKind, name: String },

    /// A row failed a constraint check; the row was not inserted/updated.
    #[error("{0}")]
    Constraint(ConstraintViolation),

    /// An invariant the engine relies on was violated. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),

    /// A wire-protocol framing violation. The connection is closed, no
    /// `ErrorResponse` is sent (the client may not even be speaking the
    /// protocol correctly enough to parse one).
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// What kind of catalog object was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Table,
    Column,
    Type,
    Index,
    Cte,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotFoundKind::Table => "table",
            NotFoundKind::Column => "column",
            NotFoundKind::Type => "type",
            NotFoundKind::Index => "index",
            NotFoundKind::Cte => "CTE",
        };
        write!(f, "{s}")
    }
}

/// A constraint violation: which constraint, on which column.
#[derive(Debug, Clone)]
pub struct ConstraintViolation {
    pub column: String,
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    NotNull,
    Unique,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConstraintKind::NotNull => {
                write!(f, "null value in column \"{}\" violates not-null constraint", self.column)
            }
            ConstraintKind::Unique => {
                write!(f, "duplicate key value violates unique constraint on \"{}\"", self.column)
            }
        }
    }
}

impl MskqlError {
    /// The 5-character SQLSTATE code this error maps to on the wire (§7).
    pub fn sqlstate(&self) -> &'static str {
        match self {
            MskqlError::Syntax(_) => "42601",
            MskqlError::Execution(_)
            | MskqlError::NotFound { .. }
            | MskqlError::Constraint(_)
            | MskqlError::Internal(_) => "42000",
            MskqlError::Protocol(_) => "08P01",
        }
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        MskqlError::Execution(msg.into())
    }

    pub fn not_found(kind: NotFoundKind, name: impl Into<String>) -> Self {
        MskqlError::NotFound { kind, name: name.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MskqlError::Internal(msg.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        MskqlError::Constraint(ConstraintViolation { column: column.into(), kind: ConstraintKind::NotNull })
    }

    pub fn unique(column: impl Into<String>) -> Self {
        MskqlError::Constraint(ConstraintViolation { column: column.into(), kind: ConstraintKind::Unique })
    }
}

pub type Result<T> = std::result::Result<T, MskqlError>;
