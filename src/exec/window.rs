//! `window` block operator (§4.12).
//!
//! Materializes the child (already materialized in this executor's
//! collect-then-emit shape, see [`super`]'s module doc), sorts globally by
//! `(partition-by, order-by)`, splits into contiguous partitions by an
//! equality run on the partition key, then evaluates each window
//! expression per row within its partition and frame.
//!
//! Frames are resolved row-wise (`ROWS` semantics) rather than by `RANGE`
//! peer-group widening; §4.12 only requires the *default* frame
//! (`RANGE UNBOUNDED PRECEDING TO CURRENT ROW`) for ordered `SUM`/`COUNT`/
//! `AVG`, which — absent duplicate order keys — coincides with the
//! row-wise equivalent. Noted as a simplification in DESIGN.md.

use crate::arena::Arena;
use crate::cell::{cell_compare, Cell, CellType};
use crate::error::Result;
use crate::eval::{eval_expr, RowCtx};
use crate::ir::select::{FrameBound, OrderByItem, WindowExpr, WindowFrame, WindowFunc};
use std::cmp::Ordering;

use super::NodeOutput;

fn col_index(names: &[String], name: &str) -> Option<usize> {
    names.iter().position(|n| n == name || n.rsplit('.').next() == Some(name))
}

pub fn exec_window(arena: &Arena, input: NodeOutput, specs: &[WindowExpr], passthrough_cols: &[String]) -> Result<NodeOutput> {
    let n = input.rows.len();
    let mut order: Vec<usize> = (0..n).collect();

    // Sort by the first window spec's (partition_by, order_by); §4.9/§4.12
    // describe a single global sort shared by every window expression in
    // the projection.
    if let Some(first) = specs.first() {
        let partition_cols: Vec<usize> = first.partition_by.iter().filter_map(|c| col_index(&input.names, c)).collect();
        let order_cols: Vec<(usize, &OrderByItem)> =
            first.order_by.iter().filter_map(|o| col_index(&input.names, &o.column).map(|i| (i, o))).collect();

        order.sort_by(|&a, &b| {
            for &col in &partition_cols {
                let ord = cell_compare(&input.rows[a].cells[col], &input.rows[b].cells[col]).unwrap_or(Ordering::Equal);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            for (col, item) in &order_cols {
                let ord = cell_compare(&input.rows[a].cells[*col], &input.rows[b].cells[*col]).unwrap_or(Ordering::Equal);
                let ord = if item.desc { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    // Split `order` into contiguous partitions by equality-run on the
    // first spec's partition columns.
    let partition_cols: Vec<usize> =
        specs.first().map(|s| s.partition_by.iter().filter_map(|c| col_index(&input.names, c)).collect()).unwrap_or_default();

    let mut partitions: Vec<Vec<usize>> = Vec::new();
    for &i in &order {
        let same_as_last = partitions.last().and_then(|p| p.last()).is_some_and(|&last| {
            partition_cols.iter().all(|&c| cell_compare(&input.rows[i].cells[c], &input.rows[last].cells[c]) == Some(Ordering::Equal))
        });
        if same_as_last {
            partitions.last_mut().unwrap().push(i);
        } else {
            partitions.push(vec![i]);
        }
    }

    let mut results: Vec<Vec<Cell>> = vec![Vec::with_capacity(specs.len()); n];
    for spec in specs {
        for partition in &partitions {
            let values = eval_one_window(arena, &input, partition, spec)?;
            for (pos, &row_idx) in partition.iter().enumerate() {
                results[row_idx].push(values[pos].clone());
            }
        }
    }

    let mut names: Vec<String> = passthrough_cols.to_vec();
    names.extend((0..specs.len()).map(|i| format!("window_{i}")));
    let mut types: Vec<CellType> = passthrough_cols
        .iter()
        .map(|c| col_index(&input.names, c).map(|i| input.types[i]).unwrap_or(CellType::Text))
        .collect();
    types.extend(specs.iter().map(window_result_type));

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let mut cells: Vec<Cell> = passthrough_cols
            .iter()
            .map(|c| col_index(&input.names, c).map(|ci| input.rows[i].cells[ci].clone()).unwrap_or(Cell::null(CellType::Text)))
            .collect();
        cells.extend(results[i].drain(..));
        rows.push(crate::cell::Row::new(cells));
    }

    Ok(NodeOutput { names, types, rows })
}

fn window_result_type(spec: &WindowExpr) -> CellType {
    match spec.func {
        WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank | WindowFunc::Ntile | WindowFunc::Count => CellType::BigInt,
        WindowFunc::PercentRank | WindowFunc::CumeDist | WindowFunc::Avg => CellType::Float,
        _ => CellType::Text,
    }
}

/// Row-wise `[start, end]` inclusive frame bounds (0-based, relative to
/// `partition`), defaulting to `UNBOUNDED PRECEDING .. CURRENT ROW` when
/// an `ORDER BY` is present and no explicit frame was given (§4.12).
fn frame_bounds(frame: &Option<WindowFrame>, has_order: bool, pos: usize, len: usize) -> (usize, usize) {
    let Some(frame) = frame else {
        return if has_order { (0, pos) } else { (0, len.saturating_sub(1)) };
    };
    let start = match frame.start {
        FrameBound::UnboundedPreceding => 0,
        FrameBound::Preceding(n) => pos.saturating_sub(n as usize),
        FrameBound::CurrentRow => pos,
        FrameBound::Following(n) => (pos + n as usize).min(len.saturating_sub(1)),
        FrameBound::UnboundedFollowing => len.saturating_sub(1),
    };
    let end = match frame.end {
        FrameBound::UnboundedPreceding => 0,
        FrameBound::Preceding(n) => pos.saturating_sub(n as usize),
        FrameBound::CurrentRow => pos,
        FrameBound::Following(n) => (pos + n as usize).min(len.saturating_sub(1)),
        FrameBound::UnboundedFollowing => len.saturating_sub(1),
    };
    (start.min(end), end.max(start))
}

fn eval_one_window(arena: &Arena, input: &NodeOutput, partition: &[usize], spec: &WindowExpr) -> Result<Vec<Cell>> {
    let len = partition.len();
    let has_order = !spec.order_by.is_empty();

    // Resolve each partition row's order key (first ORDER BY column only,
    // matching this engine's single-key window sort).
    let order_col = spec.order_by.first().and_then(|o| col_index(&input.names, &o.column));

    let arg_vals: Result<Vec<Cell>> = partition
        .iter()
        .map(|&i| {
            if spec.arg == crate::arena::IDX_NONE {
                Ok(Cell::null(CellType::Text))
            } else {
                let row = &input.rows[i];
                let rowctx = RowCtx { names: &input.names, cells: &row.cells };
                eval_expr(arena, &rowctx, spec.arg)
            }
        })
        .collect();
    let arg_vals = arg_vals?;

    let default_vals: Vec<Cell> = if spec.default_expr == crate::arena::IDX_NONE {
        vec![Cell::null(CellType::Text); len]
    } else {
        partition
            .iter()
            .map(|&i| {
                let row = &input.rows[i];
                let rowctx = RowCtx { names: &input.names, cells: &row.cells };
                eval_expr(arena, &rowctx, spec.default_expr)
            })
            .collect::<Result<_>>()?
    };

    let mut out = Vec::with_capacity(len);
    for pos in 0..len {
        let cell = match spec.func {
            WindowFunc::RowNumber => Cell::bigint((pos + 1) as i64),
            WindowFunc::Rank => {
                let rank = 1 + count_strictly_less(input, partition, order_col, pos);
                Cell::bigint(rank as i64)
            }
            WindowFunc::DenseRank => {
                let rank = 1 + count_distinct_less(input, partition, order_col, pos);
                Cell::bigint(rank as i64)
            }
            WindowFunc::PercentRank => {
                if len <= 1 {
                    Cell::float(0.0)
                } else {
                    let rank = count_strictly_less(input, partition, order_col, pos);
                    Cell::float(rank as f64 / (len - 1) as f64)
                }
            }
            WindowFunc::CumeDist => {
                let le = count_le(input, partition, order_col, pos);
                Cell::float(le as f64 / len as f64)
            }
            WindowFunc::Ntile => {
                let buckets = spec.extra_arg.unwrap_or(1).max(1) as usize;
                let bucket = pos * buckets / len.max(1);
                Cell::bigint((bucket + 1) as i64)
            }
            WindowFunc::Lag => {
                let offset = spec.extra_arg.unwrap_or(1).max(0) as usize;
                if pos >= offset {
                    arg_vals[pos - offset].clone()
                } else {
                    default_vals[pos].clone()
                }
            }
            WindowFunc::Lead => {
                let offset = spec.extra_arg.unwrap_or(1).max(0) as usize;
                if pos + offset < len {
                    arg_vals[pos + offset].clone()
                } else {
                    default_vals[pos].clone()
                }
            }
            WindowFunc::FirstValue => {
                let (s, e) = frame_bounds(&spec.frame, has_order, pos, len);
                let _ = e;
                arg_vals[s].clone()
            }
            WindowFunc::LastValue => {
                let (s, e) = frame_bounds(&spec.frame, has_order, pos, len);
                let _ = s;
                arg_vals[e].clone()
            }
            WindowFunc::NthValue => {
                let (s, e) = frame_bounds(&spec.frame, has_order, pos, len);
                let n = spec.extra_arg.unwrap_or(1).max(1) as usize;
                let idx = s + n - 1;
                if idx <= e && idx < len {
                    arg_vals[idx].clone()
                } else {
                    Cell::null(CellType::Text)
                }
            }
            WindowFunc::Sum | WindowFunc::Count | WindowFunc::Avg => {
                let (s, e) = frame_bounds(&spec.frame, has_order, pos, len);
                aggregate_frame(spec.func, &arg_vals[s..=e])
            }
        };
        out.push(cell);
    }
    Ok(out)
}

fn aggregate_frame(func: WindowFunc, vals: &[Cell]) -> Cell {
    let mut sum = 0.0;
    let mut count = 0i64;
    let mut widest = CellType::Int;
    for v in vals {
        if v.is_null() {
            continue;
        }
        if let Some(f) = v.as_f64() {
            sum += f;
            count += 1;
            if v.ty == CellType::Float || v.ty == CellType::Numeric {
                widest = CellType::Float;
            } else if v.ty == CellType::BigInt && widest != CellType::Float {
                widest = CellType::BigInt;
            }
        }
    }
    match func {
        WindowFunc::Count => Cell::bigint(count),
        WindowFunc::Avg => {
            if count == 0 {
                Cell::null(CellType::Float)
            } else {
                Cell::float(sum / count as f64)
            }
        }
        WindowFunc::Sum => {
            if count == 0 {
                Cell::null(widest)
            } else {
                match widest {
                    CellType::Float => Cell::float(sum),
                    CellType::BigInt => Cell::bigint(sum as i64),
                    _ => Cell::int(sum as i32),
                }
            }
        }
        _ => unreachable!("aggregate_frame only called for SUM/COUNT/AVG"),
    }
}

fn order_value(input: &NodeOutput, partition: &[usize], order_col: Option<usize>, pos: usize) -> Option<Cell> {
    order_col.map(|c| input.rows[partition[pos]].cells[c].clone())
}

fn count_strictly_less(input: &NodeOutput, partition: &[usize], order_col: Option<usize>, pos: usize) -> usize {
    let Some(cur) = order_value(input, partition, order_col, pos) else { return 0 };
    (0..partition.len())
        .filter(|&i| {
            order_value(input, partition, order_col, i).is_some_and(|v| cell_compare(&v, &cur) == Some(Ordering::Less))
        })
        .count()
}

fn count_le(input: &NodeOutput, partition: &[usize], order_col: Option<usize>, pos: usize) -> usize {
    let Some(cur) = order_value(input, partition, order_col, pos) else { return partition.len() };
    (0..partition.len())
        .filter(|&i| {
            order_value(input, partition, order_col, i).is_some_and(|v| cell_compare(&v, &cur) != Some(Ordering::Greater))
        })
        .count()
}

fn count_distinct_less(input: &NodeOutput, partition: &[usize], order_col: Option<usize>, pos: usize) -> usize {
    let Some(cur) = order_value(input, partition, order_col, pos) else { return 0 };
    let mut distinct: Vec<Cell> = Vec::new();
    for i in 0..partition.len() {
        if let Some(v) = order_value(input, partition, order_col, i) {
            if cell_compare(&v, &cur) == Some(Ordering::Less) && !distinct.iter().any(|d| cell_compare(d, &v) == Some(Ordering::Equal)) {
                distinct.push(v);
            }
        }
    }
    distinct.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, IDX_NONE};
    use crate::cell::Row;

    fn make_input() -> NodeOutput {
        NodeOutput {
            names: vec!["n".into()],
            types: vec![CellType::Int],
            rows: vec![Row::new(vec![Cell::int(20)]), Row::new(vec![Cell::int(10)]), Row::new(vec![Cell::int(5)])],
        }
    }

    #[test]
    fn row_number_over_order_by_desc() {
        let arena = Arena::new();
        let mut spec = WindowExpr::new(WindowFunc::RowNumber);
        spec.order_by = vec![OrderByItem { column: "n".into(), desc: true, nulls_first: None }];
        let out = exec_window(&arena, make_input(), &[spec], &["n".to_string()]).unwrap();
        let ranks: Vec<_> = out.rows.iter().map(|r| r.cells[1].as_f64()).collect();
        assert_eq!(ranks, vec![Some(1.0), Some(2.0), Some(3.0)]);
        let ns: Vec<_> = out.rows.iter().map(|r| r.cells[0].as_f64()).collect();
        assert_eq!(ns, vec![Some(20.0), Some(10.0), Some(5.0)]);
    }

    #[test]
    fn sum_without_order_is_whole_partition() {
        let arena = Arena::new();
        let mut spec = WindowExpr::new(WindowFunc::Sum);
        spec.arg = IDX_NONE;
        // use COUNT instead since arg is required for SUM in real use;
        // this test only exercises the whole-partition frame default.
        spec.func = WindowFunc::Count;
        let out = exec_window(&arena, make_input(), &[spec], &[]).unwrap();
        for row in &out.rows {
            assert_eq!(row.cells[0].as_f64(), Some(3.0));
        }
    }
}
