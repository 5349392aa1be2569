//! `mskql`: an embeddable SQL database engine with a PostgreSQL-compatible
//! wire endpoint (§1).
//!
//! The three subsystems named in §1 map onto this crate's modules as:
//! arena-backed IR → [`arena`] + [`ir`]; planner + block executor →
//! [`plan`] + [`block`] + [`exec`]; storage/transactions → [`table`] +
//! [`btree`] + [`database`]. [`dispatcher`] is the single entry point
//! (`db_exec_sql`) that ties them together; [`wire`] is the external
//! PostgreSQL-protocol adapter described at the level of the contract it
//! imposes on the core (§4.15).

pub mod arena;
pub mod block;
pub mod btree;
pub mod cell;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod eval;
pub mod exec;
pub mod ir;
pub mod legacy;
pub mod parser;
pub mod plan;
pub mod table;
pub mod wire;

pub use cell::{Cell, CellType, Column, Row, Rows};
pub use config::Config;
pub use database::Database;
pub use error::{MskqlError, Result};

/// Parse and execute one SQL statement against `db` (§4.15 `db_exec_sql`).
pub fn db_exec_sql(db: &mut database::Database, sql: &str) -> Result<Rows> {
    dispatcher::exec_sql(db, sql)
}
