//! Fixed-capacity columnar batches, selection vectors, and the hash table
//! block operators build over them (§3 "Plan node" context, §4.11).
//!
//! The reference keeps each `col_block` as a type-discriminated flat value
//! array (`i16`/`i32`/`i64`/`f64`/string-pointer) plus a null bitmap, and
//! hashes rows with type-specific mixers into an open-chaining table
//! (`buckets`/`nexts`/`hashes`). This rewrite keeps a column as `Vec<Cell>`
//! — already flat, already typed via `Cell::ty` — and keys the hash table
//! by a canonical byte encoding of the group/join key in a `HashMap`
//! rather than hand-rolled buckets and chain links: equivalent grouping
//! semantics, no manual bucket-count/chain bookkeeping. The `HashMap` is
//! given `xxh64` as its hasher, the same algorithm and seed the reference
//! uses for its own row-id hashing, instead of std's default SipHash. See
//! DESIGN.md.

use std::collections::HashMap;
use std::hash::BuildHasher;

use xxhash_rust::xxh64::Xxh64;

use crate::cell::{Cell, CellType, CellValue};

/// Seed shared by every `BlockHashTable`, matching the reference's own
/// fixed `xxh64` seed for row-id hashing.
const HASH_SEED: u64 = 0x517cc1b727220a95;

#[derive(Debug, Default, Clone, Copy)]
struct Xxh64Builder;

impl BuildHasher for Xxh64Builder {
    type Hasher = Xxh64;

    fn build_hasher(&self) -> Xxh64 {
        Xxh64::new(HASH_SEED)
    }
}

/// Rows per block (§4.11; the reference uses 1024).
pub const BLOCK_CAPACITY: usize = 1024;

/// One column of a [`Block`]: a type tag plus up to `BLOCK_CAPACITY`
/// values (nullness lives inside each `Cell`).
#[derive(Debug, Clone)]
pub struct ColBlock {
    pub ty: CellType,
    pub values: Vec<Cell>,
}

impl ColBlock {
    pub fn new(ty: CellType) -> Self {
        ColBlock { ty, values: Vec::with_capacity(BLOCK_CAPACITY) }
    }
}

/// A batch of up to [`BLOCK_CAPACITY`] rows, column-major (§GLOSSARY
/// "Block"). An optional selection vector names the active row positions
/// so a filter can narrow a block without copying columns.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub columns: Vec<ColBlock>,
    pub count: usize,
    pub selection: Option<Vec<usize>>,
}

impl Block {
    pub fn new(col_types: &[CellType]) -> Self {
        Block { columns: col_types.iter().map(|&t| ColBlock::new(t)).collect(), count: 0, selection: None }
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Number of logically active rows (respects the selection vector).
    pub fn active_count(&self) -> usize {
        self.selection.as_ref().map(|s| s.len()).unwrap_or(self.count)
    }

    /// Map a logical active-row position to its physical row index
    /// (`GLOSSARY` "Selection vector").
    pub fn row_idx(&self, i: usize) -> usize {
        match &self.selection {
            Some(sel) => sel[i],
            None => i,
        }
    }

    pub fn cell(&self, col: usize, active_row: usize) -> &Cell {
        &self.columns[col].values[self.row_idx(active_row)]
    }

    pub fn push_row(&mut self, cells: Vec<Cell>) {
        debug_assert_eq!(cells.len(), self.columns.len());
        for (c, cell) in cells.into_iter().enumerate() {
            self.columns[c].values.push(cell);
        }
        self.count += 1;
    }

    pub fn has_room(&self) -> bool {
        self.count < BLOCK_CAPACITY
    }
}

/// Canonical byte encoding of a key tuple, used both to dedup rows
/// (`DISTINCT`, `UNION`) and to group/join by equality. Stable under
/// `Eq`/`Hash` so it can key a `HashMap` directly.
pub fn encode_key(cells: &[Cell]) -> Vec<u8> {
    let mut out = Vec::new();
    for cell in cells {
        match &cell.value {
            None => out.push(0),
            Some(v) => {
                out.push(1);
                encode_value(v, &mut out);
            }
        }
    }
    out
}

fn encode_value(v: &CellValue, out: &mut Vec<u8>) {
    match v {
        CellValue::SmallInt(n) => out.extend_from_slice(&(*n as i64).to_le_bytes()),
        CellValue::Int(n) => out.extend_from_slice(&(*n as i64).to_le_bytes()),
        CellValue::BigInt(n) => out.extend_from_slice(&n.to_le_bytes()),
        CellValue::Float(f) | CellValue::Numeric(f) => out.extend_from_slice(&f.to_bits().to_le_bytes()),
        CellValue::Boolean(b) => out.push(*b as u8),
        CellValue::Text(s) => {
            out.extend_from_slice(&(s.len() as u64).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        CellValue::Enum { value, .. } => {
            out.extend_from_slice(&(value.len() as u64).to_le_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        CellValue::Date(d) => out.extend_from_slice(&d.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp().to_le_bytes()),
        CellValue::Time(t) => out.extend_from_slice(&(t.num_seconds_from_midnight() as i64).to_le_bytes()),
        CellValue::Timestamp(t) => out.extend_from_slice(&t.and_utc().timestamp_micros().to_le_bytes()),
        CellValue::TimestampTz(t) => out.extend_from_slice(&t.timestamp_micros().to_le_bytes()),
        CellValue::Interval(i) => {
            out.extend_from_slice(&i.months.to_le_bytes());
            out.extend_from_slice(&i.days.to_le_bytes());
            out.extend_from_slice(&i.micros.to_le_bytes());
        }
        CellValue::Uuid(u) => out.extend_from_slice(u.as_bytes()),
    }
}

use chrono::Timelike;

/// Arena-scoped hash table mapping a group/join key to the row indices
/// that produced it, insertion order preserved per key (§4.11, §4.12
/// `hash_agg`/`hash_join` "emit in insertion order").
#[derive(Debug, Default)]
pub struct BlockHashTable {
    buckets: HashMap<Vec<u8>, Vec<usize>, Xxh64Builder>,
    order: Vec<Vec<u8>>,
}

impl BlockHashTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &[Cell], row_idx: usize) {
        let k = encode_key(key);
        let entry = self.buckets.entry(k.clone()).or_insert_with(|| {
            self.order.push(k.clone());
            Vec::new()
        });
        entry.push(row_idx);
    }

    pub fn get(&self, key: &[Cell]) -> Option<&[usize]> {
        self.buckets.get(&encode_key(key)).map(|v| v.as_slice())
    }

    pub fn contains(&self, key: &[Cell]) -> bool {
        self.buckets.contains_key(&encode_key(key))
    }

    /// Keys in first-insertion order (`hash_agg` "emit phase streams
    /// groups in insertion order").
    pub fn keys_in_order(&self) -> impl Iterator<Item = &[usize]> {
        self.order.iter().map(move |k| self.buckets.get(k).unwrap().as_slice())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    #[test]
    fn encode_key_distinguishes_type_and_value() {
        let a = encode_key(&[Cell::int(1)]);
        let b = encode_key(&[Cell::int(2)]);
        let c = encode_key(&[Cell::null(CellType::Int)]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hash_table_preserves_insertion_order() {
        let mut ht = BlockHashTable::new();
        ht.insert(&[Cell::text("b")], 0);
        ht.insert(&[Cell::text("a")], 1);
        ht.insert(&[Cell::text("b")], 2);
        assert_eq!(ht.len(), 2);
        let groups: Vec<Vec<usize>> = ht.keys_in_order().map(|s| s.to_vec()).collect();
        assert_eq!(groups, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn selection_vector_row_idx() {
        let mut block = Block::new(&[CellType::Int]);
        block.push_row(vec![Cell::int(10)]);
        block.push_row(vec![Cell::int(20)]);
        block.push_row(vec![Cell::int(30)]);
        block.selection = Some(vec![0, 2]);
        assert_eq!(block.active_count(), 2);
        assert_eq!(block.cell(0, 1).as_f64(), Some(30.0));
    }
}
