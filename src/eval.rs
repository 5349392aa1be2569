//! Shared expression/condition evaluation used by both the block executor
//! ([`crate::exec`]) and the legacy row executor ([`crate::legacy`]) —
//! reusing one `eval_condition`/`eval_expr` path for both, per §4.13
//! ("reusing `eval_condition`, `eval_expr`").

use crate::arena::{Arena, IDX_NONE};
use crate::cell::{cell_compare, Cell, CellType, CellValue};
use crate::error::{MskqlError, Result};
use crate::ir::condition::{CmpOp, Compare, Condition};
use crate::ir::expr::{BinOp, Expr, Func, UnaryOp};
use std::cmp::Ordering;

/// A row together with the column names it can be addressed by — the
/// minimal context `eval_expr`/`eval_condition` need, independent of
/// whether the row came from a table scan or a join's merged schema.
pub struct RowCtx<'a> {
    pub names: &'a [String],
    pub cells: &'a [Cell],
}

impl<'a> RowCtx<'a> {
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.names.iter().position(|n| n == name || n.rsplit('.').next() == Some(name)).map(|i| &self.cells[i])
    }
}

pub fn eval_expr(arena: &Arena, row: &RowCtx, expr_idx: u32) -> Result<Cell> {
    if expr_idx == IDX_NONE {
        return Ok(Cell::null(CellType::Text));
    }
    match arena.exprs.get(expr_idx) {
        Expr::Literal(cell_idx) => Ok(arena.cells.get(*cell_idx).clone()),
        Expr::ColumnRef(name) => row
            .get(name)
            .cloned()
            .ok_or_else(|| MskqlError::not_found(crate::error::NotFoundKind::Column, name.clone())),
        Expr::BinaryOp { op, lhs, rhs } => {
            let l = eval_expr(arena, row, *lhs)?;
            let r = eval_expr(arena, row, *rhs)?;
            eval_binary(*op, &l, &r)
        }
        Expr::UnaryOp { op, operand } => {
            let v = eval_expr(arena, row, *operand)?;
            match op {
                UnaryOp::Neg => Ok(match v.as_f64() {
                    None => Cell::null(v.ty),
                    Some(f) => match v.ty {
                        CellType::BigInt => Cell::bigint(-(f as i64)),
                        CellType::Float | CellType::Numeric => Cell::float(-f),
                        _ => Cell::int(-(f as i32)),
                    },
                }),
            }
        }
        Expr::FuncCall { func, args_start, args_count } => {
            let arg_idxs = arena.arg_indices.slice(*args_start, *args_count);
            let args: Result<Vec<Cell>> = arg_idxs.iter().map(|&e| eval_expr(arena, row, e)).collect();
            eval_func(func.clone(), args?)
        }
        Expr::CaseWhen { branches_start, branches_count, else_expr } => {
            let branches = arena.branches.slice(*branches_start, *branches_count);
            for b in branches {
                if eval_condition(arena, row, b.cond)? {
                    return eval_expr(arena, row, b.result);
                }
            }
            if *else_expr == IDX_NONE {
                Ok(Cell::null(CellType::Text))
            } else {
                eval_expr(arena, row, *else_expr)
            }
        }
        Expr::Subquery { .. } => Err(MskqlError::internal(
            "unresolved scalar subquery reached expression evaluation (subquery resolution should have replaced it)",
        )),
    }
}

fn eval_binary(op: BinOp, l: &Cell, r: &Cell) -> Result<Cell> {
    if op == BinOp::Concat {
        return Ok(match (l.as_str(), r.as_str()) {
            (Some(a), Some(b)) => Cell::text(format!("{a}{b}")),
            _ if l.is_null() || r.is_null() => Cell::null(CellType::Text),
            _ => Cell::text(format!("{}{}", display_cell(l), display_cell(r))),
        });
    }
    if l.is_null() || r.is_null() {
        let ty = if l.ty.is_numeric() { l.ty } else { r.ty };
        return Ok(Cell::null(ty));
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(MskqlError::execution("arithmetic on non-numeric operand"));
    };
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(MskqlError::execution("division by zero"));
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(MskqlError::execution("division by zero"));
            }
            a % b
        }
        BinOp::Concat => unreachable!(),
    };
    let widened_ty = wider_numeric_type(l.ty, r.ty);
    Ok(match widened_ty {
        CellType::BigInt => Cell::bigint(result as i64),
        CellType::Float | CellType::Numeric => Cell::float(result),
        _ => Cell::int(result as i32),
    })
}

/// Widen to the larger of the two operand types so e.g. `SUM` over a
/// `BIGINT` column is not narrowed to `INT` (§9 "likely bugs" — the
/// reference detects float-ness from the source column only).
fn wider_numeric_type(a: CellType, b: CellType) -> CellType {
    use CellType::*;
    if a == Float || a == Numeric || b == Float || b == Numeric {
        Float
    } else if a == BigInt || b == BigInt {
        BigInt
    } else {
        Int
    }
}

fn display_cell(c: &Cell) -> String {
    match &c.value {
        None => String::new(),
        Some(CellValue::Text(s)) => s.clone(),
        Some(CellValue::Int(v)) => v.to_string(),
        Some(CellValue::BigInt(v)) => v.to_string(),
        Some(CellValue::SmallInt(v)) => v.to_string(),
        Some(CellValue::Float(v)) | Some(CellValue::Numeric(v)) => v.to_string(),
        Some(CellValue::Boolean(v)) => v.to_string(),
        _ => String::new(),
    }
}

fn eval_func(func: Func, args: Vec<Cell>) -> Result<Cell> {
    match func {
        Func::Coalesce => Ok(args.into_iter().find(|c| !c.is_null()).unwrap_or(Cell::null(CellType::Text))),
        Func::NullIf => {
            let (a, b) = (&args[0], &args[1]);
            if cell_compare(a, b) == Some(Ordering::Equal) {
                Ok(Cell::null(a.ty))
            } else {
                Ok(a.clone())
            }
        }
        Func::Greatest => Ok(args
            .into_iter()
            .filter(|c| !c.is_null())
            .max_by(|a, b| cell_compare(a, b).unwrap_or(Ordering::Equal))
            .unwrap_or(Cell::null(CellType::Text))),
        Func::Least => Ok(args
            .into_iter()
            .filter(|c| !c.is_null())
            .min_by(|a, b| cell_compare(a, b).unwrap_or(Ordering::Equal))
            .unwrap_or(Cell::null(CellType::Text))),
        Func::Upper => Ok(unary_text(&args, |s| s.to_uppercase())),
        Func::Lower => Ok(unary_text(&args, |s| s.to_lowercase())),
        Func::Trim => Ok(unary_text(&args, |s| s.trim().to_string())),
        Func::Length => Ok(match args[0].as_str() {
            Some(s) => Cell::int(s.chars().count() as i32),
            None => Cell::null(CellType::Int),
        }),
        Func::Substring => {
            let Some(s) = args[0].as_str() else { return Ok(Cell::null(CellType::Text)) };
            let start = args.get(1).and_then(Cell::as_f64).unwrap_or(1.0) as isize;
            let chars: Vec<char> = s.chars().collect();
            let start_idx = (start.max(1) - 1) as usize;
            let len = args.get(2).and_then(Cell::as_f64).map(|l| l as usize).unwrap_or(chars.len());
            let slice: String = chars.into_iter().skip(start_idx).take(len).collect();
            Ok(Cell::text(slice))
        }
    }
}

fn unary_text(args: &[Cell], f: impl FnOnce(&str) -> String) -> Cell {
    match args[0].as_str() {
        Some(s) => Cell::text(f(s)),
        None => Cell::null(CellType::Text),
    }
}

/// Three-valued SQL logic collapsed to Rust `bool` at the top level: a
/// `NULL` result from a predicate behaves as "not matched", matching
/// `WHERE`/`HAVING`/`ON` semantics without threading `Option<bool>`
/// through every caller.
pub fn eval_condition(arena: &Arena, row: &RowCtx, cond_idx: u32) -> Result<bool> {
    if cond_idx == IDX_NONE {
        return Ok(true);
    }
    match arena.conditions.get(cond_idx) {
        Condition::And(a, b) => Ok(eval_condition(arena, row, *a)? && eval_condition(arena, row, *b)?),
        Condition::Or(a, b) => Ok(eval_condition(arena, row, *a)? || eval_condition(arena, row, *b)?),
        Condition::Not(a) => Ok(!eval_condition(arena, row, *a)?),
        Condition::Compare(cmp) => eval_compare(arena, row, cmp),
        Condition::Literal(b) => Ok(*b),
        Condition::MultiIn { columns, rows } => {
            let lhs: Vec<Cell> = columns.iter().map(|c| row.get(c).cloned().unwrap_or(Cell::null(CellType::Text))).collect();
            for &r in rows {
                let candidate = arena.rows.get(r);
                if candidate.cells.len() == lhs.len()
                    && lhs.iter().zip(candidate.cells.iter()).all(|(a, b)| cell_compare(a, b) == Some(Ordering::Equal))
                {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn lhs_cell(arena: &Arena, row: &RowCtx, cmp: &Compare) -> Result<Cell> {
    if cmp.lhs_expr != IDX_NONE {
        eval_expr(arena, row, cmp.lhs_expr)
    } else {
        row.get(&cmp.column).cloned().ok_or_else(|| MskqlError::not_found(crate::error::NotFoundKind::Column, cmp.column.clone()))
    }
}

/// The RHS of a simple comparison: a column/expression (`rhs_expr`, set by
/// `JOIN ... ON a.x = b.y`) when present, otherwise the literal cell.
fn rhs_cell(arena: &Arena, row: &RowCtx, cmp: &Compare) -> Result<Cell> {
    if cmp.rhs_expr != IDX_NONE {
        eval_expr(arena, row, cmp.rhs_expr)
    } else if cmp.literal != IDX_NONE {
        Ok(arena.cells.get(cmp.literal).clone())
    } else {
        Err(MskqlError::internal("comparison missing RHS literal"))
    }
}

fn eval_compare(arena: &Arena, row: &RowCtx, cmp: &Compare) -> Result<bool> {
    match cmp.op {
        CmpOp::IsNull => Ok(lhs_cell(arena, row, cmp)?.is_null()),
        CmpOp::IsNotNull => Ok(!lhs_cell(arena, row, cmp)?.is_null()),
        CmpOp::Exists | CmpOp::NotExists => Err(MskqlError::internal("unresolved EXISTS reached evaluation")),
        CmpOp::Eq | CmpOp::Ne | CmpOp::Lt | CmpOp::Gt | CmpOp::Le | CmpOp::Ge => {
            let lhs = lhs_cell(arena, row, cmp)?;
            let rhs = rhs_cell(arena, row, cmp)?;
            if lhs.is_null() || rhs.is_null() {
                return Ok(false);
            }
            let Some(ord) = cell_compare(&lhs, &rhs) else { return Ok(false) };
            Ok(match cmp.op {
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Ne => ord != Ordering::Equal,
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Ge => ord != Ordering::Less,
                _ => unreachable!(),
            })
        }
        CmpOp::IsDistinctFrom => {
            let lhs = lhs_cell(arena, row, cmp)?;
            let rhs = arena.cells.get(cmp.literal);
            Ok(cell_compare(&lhs, rhs) != Some(Ordering::Equal))
        }
        CmpOp::IsNotDistinctFrom => {
            let lhs = lhs_cell(arena, row, cmp)?;
            let rhs = arena.cells.get(cmp.literal);
            Ok(cell_compare(&lhs, rhs) == Some(Ordering::Equal))
        }
        CmpOp::Between => {
            let lhs = lhs_cell(arena, row, cmp)?;
            if lhs.is_null() {
                return Ok(false);
            }
            let lo = arena.cells.get(cmp.literal);
            let hi = arena.cells.get(cmp.between_high);
            let ge_lo = cell_compare(&lhs, lo).map(|o| o != Ordering::Less).unwrap_or(false);
            let le_hi = cell_compare(&lhs, hi).map(|o| o != Ordering::Greater).unwrap_or(false);
            Ok(ge_lo && le_hi)
        }
        CmpOp::In | CmpOp::NotIn => {
            let lhs = lhs_cell(arena, row, cmp)?;
            if lhs.is_null() {
                return Ok(false);
            }
            let found = cmp.in_values.iter().any(|v| cell_compare(&lhs, v) == Some(Ordering::Equal));
            Ok(if cmp.op == CmpOp::In { found } else { !found })
        }
        CmpOp::Like | CmpOp::ILike => {
            let lhs = lhs_cell(arena, row, cmp)?;
            let Some(s) = lhs.as_str() else { return Ok(false) };
            let pattern = arena.cells.get(cmp.literal).as_str().unwrap_or("");
            Ok(sql_like(s, pattern, cmp.op == CmpOp::ILike))
        }
        CmpOp::Any => {
            let lhs = lhs_cell(arena, row, cmp)?;
            Ok(cmp.any_all_values.iter().any(|v| cell_compare(&lhs, v) == Some(Ordering::Equal)))
        }
        CmpOp::All => {
            let lhs = lhs_cell(arena, row, cmp)?;
            Ok(!cmp.any_all_values.is_empty() && cmp.any_all_values.iter().all(|v| cell_compare(&lhs, v) == Some(Ordering::Equal)))
        }
    }
}

/// `%`/`_` SQL pattern match; `ILIKE` lower-cases both sides first.
fn sql_like(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, pattern) = if case_insensitive {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };
    like_match(text.as_bytes(), pattern.as_bytes())
}

fn like_match(text: &[u8], pat: &[u8]) -> bool {
    match pat.first() {
        None => text.is_empty(),
        Some(b'%') => like_match(text, &pat[1..]) || (!text.is_empty() && like_match(&text[1..], pat)),
        Some(b'_') => !text.is_empty() && like_match(&text[1..], &pat[1..]),
        Some(&c) => !text.is_empty() && text[0] == c && like_match(&text[1..], &pat[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_matching() {
        assert!(sql_like("hello", "h%", false));
        assert!(sql_like("hello", "h_llo", false));
        assert!(!sql_like("hello", "x%", false));
        assert!(sql_like("HELLO", "hello", true));
    }

    #[test]
    fn wider_numeric_type_prefers_bigint_over_int() {
        assert_eq!(wider_numeric_type(CellType::Int, CellType::BigInt), CellType::BigInt);
        assert_eq!(wider_numeric_type(CellType::BigInt, CellType::Float), CellType::Float);
    }
}
