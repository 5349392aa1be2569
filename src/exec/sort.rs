//! `sort` block operator (§4.12 `sort`).
//!
//! Materializes the child fully (it already is, in this executor's
//! collect-then-emit shape; see the module doc on [`super`]), then sorts
//! an index vector by a flat multi-key comparator. Null ordering defaults
//! to "NULLs last for ASC, first for DESC" unless the `ORDER BY` item gave
//! an explicit `NULLS FIRST`/`NULLS LAST`.

use crate::cell::cell_compare;
use crate::error::Result;
use std::cmp::Ordering;

use super::NodeOutput;

pub fn sort_rows(mut input: NodeOutput, keys: &[String], desc: &[bool], nulls_first: &[Option<bool>]) -> Result<NodeOutput> {
    let key_cols: Vec<usize> = keys
        .iter()
        .map(|k| {
            input
                .names
                .iter()
                .position(|n| n == k || n.rsplit('.').next() == Some(k.as_str()))
                .ok_or_else(|| crate::error::MskqlError::not_found(crate::error::NotFoundKind::Column, k.clone()))
        })
        .collect::<Result<_>>()?;

    let mut idx: Vec<usize> = (0..input.rows.len()).collect();
    idx.sort_by(|&a, &b| {
        for (k, &col) in key_cols.iter().enumerate() {
            let ca = &input.rows[a].cells[col];
            let cb = &input.rows[b].cells[col];
            let is_desc = desc.get(k).copied().unwrap_or(false);
            let default_nulls_first = is_desc;
            let put_nulls_first = nulls_first.get(k).copied().flatten().unwrap_or(default_nulls_first);

            let ord = match (ca.is_null(), cb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => {
                    if put_nulls_first {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }
                (false, true) => {
                    if put_nulls_first {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
                (false, false) => {
                    let o = cell_compare(ca, cb).unwrap_or(Ordering::Equal);
                    if is_desc {
                        o.reverse()
                    } else {
                        o
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    let rows = idx.into_iter().map(|i| std::mem::take(&mut input.rows[i])).collect();
    Ok(NodeOutput { names: input.names, types: input.types, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, CellType, Row};

    fn out(vals: &[Option<i32>]) -> NodeOutput {
        NodeOutput {
            names: vec!["n".into()],
            types: vec![CellType::Int],
            rows: vals
                .iter()
                .map(|v| Row::new(vec![v.map(Cell::int).unwrap_or(Cell::null(CellType::Int))]))
                .collect(),
        }
    }

    #[test]
    fn sorts_ascending_nulls_last_by_default() {
        let input = out(&[Some(3), None, Some(1)]);
        let sorted = sort_rows(input, &["n".to_string()], &[false], &[None]).unwrap();
        let got: Vec<_> = sorted.rows.iter().map(|r| r.cells[0].as_f64()).collect();
        assert_eq!(got, vec![Some(1.0), Some(3.0), None]);
    }

    #[test]
    fn sorts_descending_nulls_first_by_default() {
        let input = out(&[Some(3), None, Some(1)]);
        let sorted = sort_rows(input, &["n".to_string()], &[true], &[None]).unwrap();
        let got: Vec<_> = sorted.rows.iter().map(|r| r.cells[0].as_f64()).collect();
        assert_eq!(got, vec![None, Some(3.0), Some(1.0)]);
    }
}
