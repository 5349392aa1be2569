//! `set_op` block operator: `UNION` / `INTERSECT` / `EXCEPT` (§4.12).
//!
//! Three-phase as specified: collect LHS into a full-row hash index,
//! stream RHS updating membership/removal marks, then emit filtered LHS.
//! `UNION ALL` never dedups; plain `UNION` dedups at both the LHS
//! collection step and the RHS append step.

use std::collections::HashMap;

use crate::block::encode_key;
use crate::error::{MskqlError, Result};
use crate::plan::SetOpKind;

use super::NodeOutput;

pub fn exec_set_op(kind: SetOpKind, all: bool, lhs: NodeOutput, rhs: NodeOutput) -> Result<NodeOutput> {
    if lhs.types.len() != rhs.types.len() {
        return Err(MskqlError::execution("set operation operands have a different number of columns"));
    }

    match kind {
        SetOpKind::Union => union(lhs, rhs, all),
        SetOpKind::Intersect => intersect(lhs, rhs, all),
        SetOpKind::Except => except(lhs, rhs, all),
    }
}

fn union(lhs: NodeOutput, rhs: NodeOutput, all: bool) -> Result<NodeOutput> {
    let names = lhs.names;
    let types = lhs.types;
    let mut rows = lhs.rows;

    if all {
        rows.extend(rhs.rows);
    } else {
        let mut seen: std::collections::HashSet<Vec<u8>> = rows.iter().map(|r| encode_key(&r.cells)).collect();
        for row in rhs.rows {
            let key = encode_key(&row.cells);
            if seen.insert(key) {
                rows.push(row);
            }
        }
    }
    Ok(NodeOutput { names, types, rows })
}

fn intersect(lhs: NodeOutput, rhs: NodeOutput, all: bool) -> Result<NodeOutput> {
    let mut rhs_counts: HashMap<Vec<u8>, usize> = HashMap::new();
    for row in &rhs.rows {
        *rhs_counts.entry(encode_key(&row.cells)).or_insert(0) += 1;
    }

    let mut rows = Vec::new();
    let mut emitted: HashMap<Vec<u8>, usize> = HashMap::new();
    for row in lhs.rows {
        let key = encode_key(&row.cells);
        let Some(&avail) = rhs_counts.get(&key) else { continue };
        let already = emitted.entry(key.clone()).or_insert(0);
        if all {
            if *already < avail {
                *already += 1;
                rows.push(row);
            }
        } else if *already == 0 {
            *already = 1;
            rows.push(row);
        }
    }
    Ok(NodeOutput { names: lhs.names, types: lhs.types, rows })
}

fn except(lhs: NodeOutput, rhs: NodeOutput, all: bool) -> Result<NodeOutput> {
    let mut rhs_counts: HashMap<Vec<u8>, usize> = HashMap::new();
    for row in &rhs.rows {
        *rhs_counts.entry(encode_key(&row.cells)).or_insert(0) += 1;
    }

    let mut rows = Vec::new();
    let mut consumed: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut emitted_distinct: std::collections::HashSet<Vec<u8>> = std::collections::HashSet::new();
    for row in lhs.rows {
        let key = encode_key(&row.cells);
        let avail = rhs_counts.get(&key).copied().unwrap_or(0);
        let used = consumed.entry(key.clone()).or_insert(0);
        if *used < avail {
            *used += 1;
            continue;
        }
        if all {
            rows.push(row);
        } else if emitted_distinct.insert(key) {
            rows.push(row);
        }
    }
    Ok(NodeOutput { names: lhs.names, types: lhs.types, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, CellType, Row};

    fn out(vals: &[i32]) -> NodeOutput {
        NodeOutput {
            names: vec!["n".into()],
            types: vec![CellType::Int],
            rows: vals.iter().map(|&v| Row::new(vec![Cell::int(v)])).collect(),
        }
    }

    #[test]
    fn union_all_sums_cardinality() {
        let out = exec_set_op(SetOpKind::Union, true, out(&[1, 2]), out(&[3, 4, 5])).unwrap();
        assert_eq!(out.rows.len(), 5);
    }

    #[test]
    fn union_dedups() {
        let out = exec_set_op(SetOpKind::Union, false, out(&[1, 2]), out(&[2, 3])).unwrap();
        assert_eq!(out.rows.len(), 3);
    }

    #[test]
    fn intersect_is_subset_of_lhs() {
        let out = exec_set_op(SetOpKind::Intersect, false, out(&[1, 2, 2]), out(&[2, 2, 3])).unwrap();
        assert_eq!(out.rows.len(), 1);
    }

    #[test]
    fn except_excludes_rhs_rows() {
        let out = exec_set_op(SetOpKind::Except, false, out(&[1, 2, 3]), out(&[2])).unwrap();
        let vals: Vec<_> = out.rows.iter().map(|r| r.cells[0].as_f64()).collect();
        assert_eq!(vals, vec![Some(1.0), Some(3.0)]);
    }
}
