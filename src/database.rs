//! Database catalog: tables, enum types, sequences, and the single
//! in-flight transaction snapshot (§3 "Database", §4.5, §4.7). Grounded in
//! `database.h`.

use crate::error::{MskqlError, NotFoundKind, Result};
use crate::table::Table;

/// `CREATE TYPE name AS ENUM (...)` (§3 "Enum type").
#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

impl EnumType {
    pub fn ordinal_of(&self, value: &str) -> Option<u32> {
        self.values.iter().position(|v| v == value).map(|p| p as u32)
    }
}

/// A `SERIAL`/`BIGSERIAL` backing sequence (§SPEC_FULL.md B.1, `database.h`
/// `struct sequence`).
#[derive(Debug, Clone)]
pub struct Sequence {
    pub name: String,
    pub current_value: i64,
    pub increment: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub has_been_called: bool,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Sequence {
            name: name.into(),
            current_value: 1,
            increment: 1,
            min_value: 1,
            max_value: i64::MAX,
            has_been_called: false,
        }
    }

    /// Advance and return the next value, matching PostgreSQL `nextval()`:
    /// the first call returns `current_value` unchanged, every call after
    /// that increments first.
    pub fn next_value(&mut self) -> i64 {
        if !self.has_been_called {
            self.has_been_called = true;
            return self.current_value;
        }
        self.current_value = (self.current_value + self.increment).min(self.max_value);
        self.current_value
    }
}

/// A deep copy of catalog state, taken on `BEGIN` and either dropped
/// (`COMMIT`) or swapped back in (`ROLLBACK`) (§4.7).
struct Snapshot {
    tables: Vec<Table>,
    types: Vec<EnumType>,
    sequences: Vec<Sequence>,
}

pub struct Database {
    pub name: String,
    pub tables: Vec<Table>,
    pub types: Vec<EnumType>,
    pub sequences: Vec<Sequence>,
    pub in_transaction: bool,
    snapshot: Option<Snapshot>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Database {
            name: name.into(),
            tables: Vec::new(),
            types: Vec::new(),
            sequences: Vec::new(),
            in_transaction: false,
            snapshot: None,
        }
    }

    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn find_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    pub fn find_type(&self, name: &str) -> Option<&EnumType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn find_sequence_mut(&mut self, name: &str) -> Option<&mut Sequence> {
        self.sequences.iter_mut().find(|s| s.name == name)
    }

    pub fn create_table(&mut self, table: Table) -> Result<()> {
        if self.find_table(&table.name).is_some() {
            return Err(MskqlError::execution(format!("relation \"{}\" already exists", table.name)));
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let before = self.tables.len();
        self.tables.retain(|t| t.name != name);
        if self.tables.len() == before {
            return Err(MskqlError::not_found(NotFoundKind::Table, name));
        }
        Ok(())
    }

    pub fn create_type(&mut self, ty: EnumType) -> Result<()> {
        if self.find_type(&ty.name).is_some() {
            return Err(MskqlError::execution(format!("type \"{}\" already exists", ty.name)));
        }
        self.types.push(ty);
        Ok(())
    }

    pub fn drop_type(&mut self, name: &str) -> Result<()> {
        let before = self.types.len();
        self.types.retain(|t| t.name != name);
        if self.types.len() == before {
            return Err(MskqlError::not_found(NotFoundKind::Type, name));
        }
        Ok(())
    }

    pub fn create_sequence(&mut self, seq: Sequence) {
        self.sequences.push(seq);
    }

    /// Remove a temporary table (CTE / `FROM (SELECT ...)` materialization)
    /// by name (§4.5 `remove_temp_table`; collapses the reference's
    /// pointer-identity removal to a name match, the one Rust-appropriate
    /// shape for an owned `Vec<Table>`).
    pub fn remove_temp_table(&mut self, name: &str) {
        self.tables.retain(|t| t.name != name);
    }

    /// `BEGIN`: forbid nesting, deep-copy catalog state into a snapshot
    /// (§4.7). Nesting is tolerated per §4.7's "tolerant by design" —
    /// callers observe the warning via the returned `bool` (`false` means
    /// "already in a transaction, no-op").
    pub fn begin(&mut self) -> bool {
        if self.in_transaction {
            return false;
        }
        self.snapshot = Some(Snapshot {
            tables: self.tables.iter().map(Table::deep_copy).collect(),
            types: self.types.clone(),
            sequences: self.sequences.clone(),
        });
        self.in_transaction = true;
        true
    }

    /// `COMMIT`: drop the snapshot. Returns `false` if no transaction was
    /// open (tolerant per §4.7).
    pub fn commit(&mut self) -> bool {
        if !self.in_transaction {
            return false;
        }
        self.snapshot = None;
        self.in_transaction = false;
        true
    }

    /// `ROLLBACK`: restore catalog state from the snapshot. Returns
    /// `false` if no transaction was open.
    pub fn rollback(&mut self) -> bool {
        let Some(snap) = self.snapshot.take() else { return false };
        self.tables = snap.tables;
        self.types = snap.types;
        self.sequences = snap.sequences;
        self.in_transaction = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_commit_drops_snapshot() {
        let mut db = Database::new("test");
        db.create_table(Table::new("t")).unwrap();
        assert!(db.begin());
        assert!(db.commit());
        assert!(!db.in_transaction);
    }

    #[test]
    fn rollback_restores_prior_state() {
        let mut db = Database::new("test");
        db.create_table(Table::new("t")).unwrap();
        assert!(db.begin());
        db.create_table(Table::new("u")).unwrap();
        assert_eq!(db.tables.len(), 2);
        assert!(db.rollback());
        assert_eq!(db.tables.len(), 1);
        assert_eq!(db.tables[0].name, "t");
    }

    #[test]
    fn nested_begin_is_tolerated_noop() {
        let mut db = Database::new("test");
        assert!(db.begin());
        assert!(!db.begin());
    }

    #[test]
    fn commit_without_transaction_is_tolerated_noop() {
        let mut db = Database::new("test");
        assert!(!db.commit());
    }

    #[test]
    fn sequence_first_call_does_not_advance() {
        let mut seq = Sequence::new("t_id_seq");
        assert_eq!(seq.next_value(), 1);
        assert_eq!(seq.next_value(), 2);
        assert_eq!(seq.next_value(), 3);
    }
}
