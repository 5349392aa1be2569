//! Table storage: row store, schema, secondary indexes and a generation
//! counter (§3 "Table", §4.4, §4.10). Grounded in `table.h`/`index.h` of
//! the reference implementation.

use crate::btree::{BTree, MAX_INDEX_COLS};
use crate::cell::{Cell, CellType, Column, Row};
use crate::error::{MskqlError, NotFoundKind, Result};

/// A secondary index: named, over 1–[`MAX_INDEX_COLS`] columns, backed by
/// a [`BTree`] mapping the composite key to the row-ids that hold it
/// (§3 "Index").
pub struct Index {
    pub name: String,
    pub column_indices: Vec<usize>,
    pub is_unique: bool,
    pub tree: BTree,
}

impl Index {
    pub fn new(name: impl Into<String>, column_indices: Vec<usize>, is_unique: bool) -> Self {
        assert!(!column_indices.is_empty() && column_indices.len() <= MAX_INDEX_COLS);
        let ncols = column_indices.len();
        Index { name: name.into(), column_indices, is_unique, tree: BTree::new(ncols) }
    }

    fn key_of(&self, row: &Row) -> Vec<Cell> {
        self.column_indices.iter().map(|&i| row.cells[i].clone()).collect()
    }

    pub fn insert_row(&mut self, row: &Row, row_id: usize) {
        self.tree.insert(&self.key_of(row), row_id);
    }

    pub fn remove_row(&mut self, row: &Row, row_id: usize) {
        self.tree.remove(&self.key_of(row), row_id);
    }

    pub fn lookup(&self, keys: &[Cell]) -> Vec<usize> {
        self.tree.lookup(keys)
    }
}

pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub indexes: Vec<Index>,
    /// Bumped on every row mutation (§4.10 "Generation"); recursive CTE
    /// materialization uses this to invalidate state it holds about a
    /// working table (§4.14).
    pub generation: u64,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table { name: name.into(), columns: Vec::new(), rows: Vec::new(), indexes: Vec::new(), generation: 0 }
    }

    pub fn add_column(&mut self, col: Column) {
        self.columns.push(col);
    }

    /// Exact-match lookup; if that fails and `name` contains `.`, retry on
    /// the suffix after the last dot (§4.4 — tolerates `alias.col`
    /// spellings reaching table-level lookup).
    pub fn find_column(&self, name: &str) -> Option<usize> {
        if let Some(i) = self.columns.iter().position(|c| c.name == name) {
            return Some(i);
        }
        if let Some(dot) = name.rfind('.') {
            let suffix = &name[dot + 1..];
            return self.columns.iter().position(|c| c.name == suffix);
        }
        None
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
    }

    pub fn insert_row(&mut self, mut row: Row) -> Result<usize> {
        row.pad_to(&self.columns);
        for (i, col) in self.columns.iter().enumerate() {
            if col.not_null && row.cells[i].is_null() {
                return Err(MskqlError::not_null(&col.name));
            }
        }
        for idx in &self.indexes {
            if idx.is_unique {
                let key: Vec<Cell> = idx.column_indices.iter().map(|&i| row.cells[i].clone()).collect();
                if !idx.lookup(&key).is_empty() {
                    return Err(MskqlError::unique(idx.name.clone()));
                }
            }
        }
        let row_id = self.rows.len();
        for idx in &mut self.indexes {
            idx.insert_row(&row, row_id);
        }
        self.rows.push(row);
        self.bump_generation();
        Ok(row_id)
    }

    pub fn delete_row(&mut self, row_id: usize) {
        if row_id >= self.rows.len() {
            return;
        }
        let row = self.rows.remove(row_id);
        for idx in &mut self.indexes {
            idx.remove_row(&row, row_id);
        }
        // Row-ids shift after a removal; indexes are rebuilt from scratch
        // rather than patched, matching §9's preference for
        // rebuild-on-mismatch over fragile in-place patching.
        self.rebuild_indexes();
        self.bump_generation();
    }

    pub fn update_row(&mut self, row_id: usize, new_row: Row) {
        if row_id >= self.rows.len() {
            return;
        }
        for idx in &mut self.indexes {
            idx.remove_row(&self.rows[row_id], row_id);
        }
        self.rows[row_id] = new_row;
        for idx in &mut self.indexes {
            idx.insert_row(&self.rows[row_id], row_id);
        }
        self.bump_generation();
    }

    fn rebuild_indexes(&mut self) {
        for idx in &mut self.indexes {
            idx.tree.reset();
            for (row_id, row) in self.rows.iter().enumerate() {
                idx.insert_row(row, row_id);
            }
        }
    }

    pub fn create_index(&mut self, name: impl Into<String>, column_indices: Vec<usize>, is_unique: bool) {
        let mut idx = Index::new(name, column_indices, is_unique);
        for (row_id, row) in self.rows.iter().enumerate() {
            idx.insert_row(row, row_id);
        }
        self.indexes.push(idx);
    }

    pub fn find_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.name != name);
        self.indexes.len() != before
    }

    pub fn add_column_with_default(&mut self, col: Column, default: Cell) {
        for row in &mut self.rows {
            row.cells.push(default.clone());
        }
        self.columns.push(col);
        self.rebuild_indexes();
        self.bump_generation();
    }

    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        let i = self
            .find_column(name)
            .ok_or_else(|| MskqlError::not_found(NotFoundKind::Column, name))?;
        self.columns.remove(i);
        for row in &mut self.rows {
            row.cells.remove(i);
        }
        self.indexes.retain(|idx| !idx.column_indices.contains(&i));
        for idx in &mut self.indexes {
            for ci in &mut idx.column_indices {
                if *ci > i {
                    *ci -= 1;
                }
            }
        }
        self.rebuild_indexes();
        self.bump_generation();
        Ok(())
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        let i = self
            .find_column(old)
            .ok_or_else(|| MskqlError::not_found(NotFoundKind::Column, old))?;
        self.columns[i].name = new.to_string();
        Ok(())
    }

    pub fn alter_column_type(&mut self, name: &str, new_type: CellType) -> Result<()> {
        let i = self
            .find_column(name)
            .ok_or_else(|| MskqlError::not_found(NotFoundKind::Column, name))?;
        self.columns[i].ty = new_type;
        for row in &mut self.rows {
            row.cells[i].ty = new_type;
        }
        self.rebuild_indexes();
        self.bump_generation();
        Ok(())
    }

    /// Deep copy used by snapshot creation and restore (§4.4, §4.7).
    /// Indexes are rebuilt rather than cloned node-for-node — cheap at the
    /// data sizes this engine targets, and sidesteps needing `Clone` on
    /// the B-tree's internal node graph.
    pub fn deep_copy(&self) -> Table {
        let mut copy = Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            indexes: Vec::new(),
            generation: self.generation,
        };
        for idx in &self.indexes {
            copy.create_index(idx.name.clone(), idx.column_indices.clone(), idx.is_unique);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellType;

    fn make_table() -> Table {
        let mut t = Table::new("t");
        t.add_column(Column::new("id", CellType::Int));
        t.add_column(Column::new("name", CellType::Text));
        t
    }

    #[test]
    fn insert_bumps_generation() {
        let mut t = make_table();
        assert_eq!(t.generation, 0);
        t.insert_row(Row { cells: vec![Cell::int(1), Cell::text("a")] }).unwrap();
        assert_eq!(t.generation, 1);
    }

    #[test]
    fn not_null_violation_rejected() {
        let mut t = make_table();
        t.columns[0].not_null = true;
        let err = t.insert_row(Row { cells: vec![Cell::null(CellType::Int), Cell::text("a")] });
        assert!(err.is_err());
    }

    #[test]
    fn unique_index_rejects_duplicate() {
        let mut t = make_table();
        t.create_index("ix_id", vec![0], true);
        t.insert_row(Row { cells: vec![Cell::int(1), Cell::text("a")] }).unwrap();
        let err = t.insert_row(Row { cells: vec![Cell::int(1), Cell::text("b")] });
        assert!(err.is_err());
    }

    #[test]
    fn find_column_strips_table_prefix() {
        let t = make_table();
        assert_eq!(t.find_column("name"), Some(1));
        assert_eq!(t.find_column("t.name"), Some(1));
        assert_eq!(t.find_column("missing"), None);
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut t = make_table();
        t.insert_row(Row { cells: vec![Cell::int(1), Cell::text("a")] }).unwrap();
        let mut copy = t.deep_copy();
        copy.insert_row(Row { cells: vec![Cell::int(2), Cell::text("b")] }).unwrap();
        assert_eq!(t.rows.len(), 1);
        assert_eq!(copy.rows.len(), 2);
    }
}
