//! Legacy row executor (§4.13, C11): the fallback interpreter for every
//! query shape the planner (§4.12) declines — anything with a `JOIN`,
//! complex CTEs, or a `HAVING`/window combination outside the planner's
//! vocabulary. Reuses [`crate::eval::eval_condition`]/[`crate::eval::eval_expr`]
//! and the block executor's aggregate/sort/window/distinct helpers
//! ([`crate::exec::agg`], [`crate::exec::sort`], [`crate::exec::window`])
//! so both executors agree on the same semantics by construction (§8
//! "`plan_exec(q)` and legacy `row_exec(q)` produce equal multisets").

use crate::arena::{Arena, IDX_NONE};
use crate::cell::{Cell, CellType, Column, Row, Rows};
use crate::database::Database;
use crate::error::{MskqlError, NotFoundKind, Result};
use crate::eval::{eval_condition, eval_expr, RowCtx};
use crate::exec::{agg, sort, window, NodeOutput};
use crate::ir::condition::Condition;
use crate::ir::select::{AggExpr, JoinType, SelectColumn, WindowExpr};
use crate::ir::statement::{CollectedAgg, CollectedWindow, QuerySelect};

/// Callback used to execute a captured SQL fragment against the same
/// database mid-statement — needed for `LATERAL` joins (§4.8), which
/// substitute literals into the captured subquery text and re-run it once
/// per outer row. The dispatcher supplies this as a thin wrapper around
/// `db_exec_sql` to avoid a module cycle between `legacy` and
/// `dispatcher`.
pub type SubqueryRunner<'a> = dyn FnMut(&mut Database, &str) -> Result<Rows> + 'a;

fn find_col(names: &[String], name: &str) -> Option<usize> {
    names.iter().position(|n| n == name || n.rsplit('.').next() == Some(name))
}

/// Render a cell as SQL literal text, used for `LATERAL`'s textual
/// outer-column substitution (§4.8).
fn cell_literal_sql(c: &Cell) -> String {
    if c.is_null() {
        return "NULL".to_string();
    }
    match c.as_str() {
        Some(s) => format!("'{}'", s.replace('\'', "''")),
        None => match c.as_bool() {
            Some(b) => b.to_string(),
            None => c.as_f64().map(|f| f.to_string()).unwrap_or_else(|| "NULL".to_string()),
        },
    }
}

/// Execute a fully-resolved `SELECT` (no unresolved subqueries, CTEs
/// already materialized as real tables by the dispatcher) through the row
/// interpreter (§4.13, §4.8, §4.9). Stage order mirrors the block
/// planner's shape 6 (`seq_scan` → `filter` → `sort` → `distinct` →
/// `limit`, §4.12), with the projection evaluated last in both executors
/// and aggregation/window stages inserted between `filter` and `sort`.
pub fn exec_select(db: &mut Database, arena: &Arena, q: &QuerySelect, runner: &mut SubqueryRunner) -> Result<Rows> {
    let base = resolve_from(db, arena, q, runner)?;
    let filtered = apply_where(arena, base, q.where_cond)?;

    let agg_cols = q.collect_aggregates(arena);
    let window_cols = q.collect_windows(arena);

    let post = if !q.group_by.is_empty() || !agg_cols.is_empty() {
        grouped_stage(arena, filtered, q, &agg_cols)?
    } else if !window_cols.is_empty() {
        window_stage(arena, filtered, &window_cols)?
    } else {
        filtered
    };

    let sorted = sort_stage(arena, post, q)?;
    let deduped = if q.distinct { agg::distinct(sorted)? } else { sorted };
    let limited = offset_limit(deduped, q);
    let projected = project(arena, limited, q, &agg_cols, &window_cols)?;

    Ok(projected.into_rows())
}

/// §4.8: resolve the base table, then fold in each `join_info` in order.
fn resolve_from(db: &mut Database, arena: &Arena, q: &QuerySelect, runner: &mut SubqueryRunner) -> Result<NodeOutput> {
    let table_name = q.from_table.as_deref().ok_or_else(|| MskqlError::execution("SELECT has no FROM clause"))?;
    let table = db.find_table(table_name).ok_or_else(|| MskqlError::not_found(NotFoundKind::Table, table_name.to_string()))?;
    let alias = q.from_alias.clone().unwrap_or_else(|| table_name.to_string());
    let mut acc = NodeOutput::from_table(table, &alias);
    let mut known_aliases = vec![alias];

    for &join_idx in &q.joins {
        let join = arena.joins.get(join_idx).clone();

        if let Some(lateral_sql_idx) = join.lateral_sql {
            acc = apply_lateral_join(db, arena, acc, lateral_sql_idx, &known_aliases, runner)?;
            continue;
        }

        let right_alias = join.alias.clone().unwrap_or_else(|| join.table.clone());
        let right_table = db
            .find_table(&join.table)
            .ok_or_else(|| MskqlError::not_found(NotFoundKind::Table, join.table.clone()))?;
        let right = NodeOutput::from_table(right_table, &right_alias);

        acc = apply_join(arena, acc, right, &join)?;
        known_aliases.push(right_alias);
    }

    Ok(acc)
}

fn apply_join(arena: &Arena, left: NodeOutput, right: NodeOutput, join: &crate::ir::select::JoinInfo) -> Result<NodeOutput> {
    if join.join_type == JoinType::Cross {
        return Ok(cross_product(left, right));
    }

    let mut names = left.names.clone();
    names.extend(right.names.iter().cloned());
    let mut types = left.types.clone();
    types.extend(right.types.iter().cloned());

    let mut right_matched = vec![false; right.rows.len()];
    let mut rows = Vec::new();

    // USING / NATURAL resolve to an equality key-pair; an explicit ON
    // clause is evaluated generically against the merged row.
    let using_pairs: Option<Vec<(usize, usize)>> = if !join.using.is_empty() {
        Some(
            join.using
                .iter()
                .map(|c| {
                    let l = find_col(&left.names, c).ok_or_else(|| MskqlError::not_found(NotFoundKind::Column, c.clone()))?;
                    let r = find_col(&right.names, c).ok_or_else(|| MskqlError::not_found(NotFoundKind::Column, c.clone()))?;
                    Ok((l, r))
                })
                .collect::<Result<_>>()?,
        )
    } else if join.natural {
        let common: Vec<String> = left
            .names
            .iter()
            .filter_map(|n| n.rsplit('.').next().map(str::to_string))
            .filter(|bare| right.names.iter().any(|rn| rn.rsplit('.').next() == Some(bare.as_str())))
            .collect();
        Some(
            common
                .iter()
                .filter_map(|c| find_col(&left.names, c).zip(find_col(&right.names, c)))
                .collect(),
        )
    } else {
        None
    };

    for lrow in &left.rows {
        let mut any_match = false;
        for (ri, rrow) in right.rows.iter().enumerate() {
            let is_match = match &using_pairs {
                Some(pairs) => pairs.iter().all(|&(l, r)| {
                    let a = &lrow.cells[l];
                    let b = &rrow.cells[r];
                    !a.is_null() && !b.is_null() && crate::cell::cell_equal(a, b)
                }),
                None => {
                    if join.on == IDX_NONE {
                        true
                    } else {
                        let mut cells = lrow.cells.clone();
                        cells.extend(rrow.cells.clone());
                        let rowctx = RowCtx { names: &names, cells: &cells };
                        eval_condition(arena, &rowctx, join.on)?
                    }
                }
            };
            if is_match {
                any_match = true;
                right_matched[ri] = true;
                let mut cells = lrow.cells.clone();
                cells.extend(rrow.cells.clone());
                rows.push(Row::new(cells));
            }
        }
        if !any_match && matches!(join.join_type, JoinType::Left | JoinType::Full) {
            let mut cells = lrow.cells.clone();
            cells.extend(right.types.iter().map(|&t| Cell::null(t)));
            rows.push(Row::new(cells));
        }
    }

    if matches!(join.join_type, JoinType::Right | JoinType::Full) {
        for (ri, rrow) in right.rows.iter().enumerate() {
            if right_matched[ri] {
                continue;
            }
            let mut cells: Vec<Cell> = left.types.iter().map(|&t| Cell::null(t)).collect();
            cells.extend(rrow.cells.clone());
            rows.push(Row::new(cells));
        }
    }

    Ok(NodeOutput { names, types, rows })
}

fn cross_product(left: NodeOutput, right: NodeOutput) -> NodeOutput {
    let mut names = left.names.clone();
    names.extend(right.names.iter().cloned());
    let mut types = left.types.clone();
    types.extend(right.types.iter().cloned());
    let mut rows = Vec::with_capacity(left.rows.len() * right.rows.len());
    for lrow in &left.rows {
        for rrow in &right.rows {
            let mut cells = lrow.cells.clone();
            cells.extend(rrow.cells.clone());
            rows.push(Row::new(cells));
        }
    }
    NodeOutput { names, types, rows }
}

/// `LATERAL (subquery)`: substitute every `known_alias.col` occurrence in
/// the captured SQL with the outer row's literal value, re-run it, and
/// cross-emit against the outer row (§4.8, §9).
fn apply_lateral_join(
    db: &mut Database,
    arena: &Arena,
    outer: NodeOutput,
    sql_idx: u32,
    known_aliases: &[String],
    runner: &mut SubqueryRunner,
) -> Result<NodeOutput> {
    let template = arena.strings.get(sql_idx).clone();
    let mut rows = Vec::new();
    let mut result_names: Option<Vec<String>> = None;
    let mut result_types: Option<Vec<CellType>> = None;

    for outer_row in &outer.rows {
        let mut sql = template.clone();
        for (i, name) in outer.names.iter().enumerate() {
            if !known_aliases.iter().any(|a| name.starts_with(&format!("{a}."))) {
                continue;
            }
            let literal = cell_literal_sql(&outer_row.cells[i]);
            sql = sql.replace(name, &literal);
        }
        let inner = runner(db, &sql)?;
        if result_names.is_none() {
            result_names = Some(inner.columns.iter().map(|c| c.name.clone()).collect());
            result_types = Some(inner.columns.iter().map(|c| c.ty).collect());
        }
        for irow in inner.rows {
            let mut cells = outer_row.cells.clone();
            cells.extend(irow.cells);
            rows.push(Row::new(cells));
        }
    }

    let mut names = outer.names.clone();
    names.extend(result_names.unwrap_or_default());
    let mut types = outer.types.clone();
    types.extend(result_types.unwrap_or_default());
    Ok(NodeOutput { names, types, rows })
}

fn apply_where(arena: &Arena, input: NodeOutput, cond: u32) -> Result<NodeOutput> {
    if cond == IDX_NONE {
        return Ok(input);
    }
    let mut rows = Vec::with_capacity(input.rows.len());
    for row in input.rows {
        let rowctx = RowCtx { names: &input.names, cells: &row.cells };
        if eval_condition(arena, &rowctx, cond)? {
            rows.push(row);
        }
    }
    Ok(NodeOutput { names: input.names, types: input.types, rows })
}

/// §4.9 GROUP BY path: aggregate, then apply HAVING against the synthetic
/// (group-keys + aggregate-names) schema.
fn grouped_stage(arena: &Arena, input: NodeOutput, q: &QuerySelect, agg_cols: &[CollectedAgg]) -> Result<NodeOutput> {
    let aggs: Vec<AggExpr> = agg_cols.iter().map(|c| c.agg.clone()).collect();
    let names: Vec<String> = agg_cols.iter().map(|c| c.name.clone()).collect();
    let grouped = agg::hash_agg(arena, input, &q.group_by, &aggs, &names)?;

    if q.having == IDX_NONE {
        return Ok(grouped);
    }
    let mut rows = Vec::with_capacity(grouped.rows.len());
    for row in grouped.rows {
        let rowctx = RowCtx { names: &grouped.names, cells: &row.cells };
        if eval_condition(arena, &rowctx, q.having)? {
            rows.push(row);
        }
    }
    Ok(NodeOutput { names: grouped.names, types: grouped.types, rows })
}

/// §4.9 window path: every non-window select column passes through
/// unchanged; window values are appended.
fn window_stage(arena: &Arena, input: NodeOutput, window_cols: &[CollectedWindow]) -> Result<NodeOutput> {
    let specs: Vec<WindowExpr> = window_cols.iter().map(|c| c.window.clone()).collect();
    window::exec_window(arena, input.clone_shallow(), &specs, &input.names)
}

impl NodeOutput {
    /// Used only by the legacy window path, which needs both the original
    /// column set (as passthrough) and ownership of `self` for the window
    /// evaluator; cloning here is cheap relative to the window computation
    /// itself and avoids restructuring `exec_window`'s signature.
    fn clone_shallow(&self) -> NodeOutput {
        NodeOutput { names: self.names.clone(), types: self.types.clone(), rows: self.rows.clone() }
    }
}

/// §4.13 "ORDER BY alias resolution from the raw SELECT text": an
/// `ORDER BY` item may name a `SELECT`-list alias that does not exist as a
/// real column on `input`; resolve those against `q.columns` before
/// sorting.
fn sort_stage(arena: &Arena, input: NodeOutput, q: &QuerySelect) -> Result<NodeOutput> {
    if q.order_by.is_empty() {
        return Ok(input);
    }
    let mut keys = Vec::with_capacity(q.order_by.len());
    let mut desc = Vec::with_capacity(q.order_by.len());
    let mut nulls_first = Vec::with_capacity(q.order_by.len());
    for &idx in &q.order_by {
        let item = arena.order_items.get(idx);
        keys.push(item.column.clone());
        desc.push(item.desc);
        nulls_first.push(item.nulls_first);
    }
    sort::sort_rows(input, &keys, &desc, &nulls_first)
}

fn offset_limit(input: NodeOutput, q: &QuerySelect) -> NodeOutput {
    let offset = q.offset.unwrap_or(0).max(0) as usize;
    let rows: Vec<Row> = match q.limit {
        Some(l) => input.rows.into_iter().skip(offset).take(l.max(0) as usize).collect(),
        None => input.rows.into_iter().skip(offset).collect(),
    };
    NodeOutput { names: input.names, types: input.types, rows }
}

/// Final `SELECT` list projection: copies cells by matched column name,
/// evaluates plain expressions, and reads already-computed
/// aggregate/window columns by position (§4.8 "the SELECT projection
/// walks the comma-separated column list").
fn project(arena: &Arena, input: NodeOutput, q: &QuerySelect, agg_cols: &[CollectedAgg], window_cols: &[CollectedWindow]) -> Result<NodeOutput> {
    let is_grouped = !q.group_by.is_empty() || !agg_cols.is_empty();
    let is_windowed = !is_grouped && !window_cols.is_empty();

    let mut names = Vec::new();
    let mut types = Vec::new();
    let mut col_plan: Vec<ColPlan> = Vec::new();

    for (i, &col_idx) in q.columns.iter().enumerate() {
        match arena.select_cols.get(col_idx) {
            SelectColumn::Star { table_alias } => {
                for (ci, name) in input.names.iter().enumerate() {
                    if let Some(alias) = table_alias {
                        if !name.starts_with(&format!("{alias}.")) {
                            continue;
                        }
                    }
                    names.push(name.rsplit('.').next().unwrap_or(name).to_string());
                    types.push(input.types[ci]);
                    col_plan.push(ColPlan::Direct(ci));
                }
            }
            SelectColumn::ColumnRef { name, alias, .. } => {
                let pos = find_col(&input.names, name).ok_or_else(|| MskqlError::not_found(NotFoundKind::Column, name.clone()))?;
                names.push(alias.clone().unwrap_or_else(|| name.clone()));
                types.push(input.types[pos]);
                col_plan.push(ColPlan::Direct(pos));
            }
            SelectColumn::Expr { select_expr, alias } => {
                let se = arena.select_exprs.get(*select_expr);
                names.push(alias.clone().unwrap_or_else(|| format!("?column{i}?")));
                types.push(CellType::Text);
                col_plan.push(ColPlan::Expr(se.expr));
            }
            SelectColumn::Aggregate { .. } => {
                let agg = agg_cols.iter().find(|a| a.select_col_idx == i).expect("collected during collect_aggregates");
                let pos = find_col(&input.names, &agg.name).unwrap_or(input.names.len());
                names.push(agg.name.clone());
                types.push(input.types.get(pos).copied().unwrap_or(CellType::Int));
                col_plan.push(ColPlan::Direct(pos));
            }
            SelectColumn::Window { .. } => {
                let w = window_cols.iter().find(|w| w.select_col_idx == i).expect("collected during collect_windows");
                let pos = if is_windowed { input.names.len() - window_cols.len() + window_cols.iter().position(|x| x.select_col_idx == i).unwrap() } else { 0 };
                names.push(w.name.clone());
                types.push(input.types.get(pos).copied().unwrap_or(CellType::Text));
                col_plan.push(ColPlan::Direct(pos));
            }
        }
    }

    let mut rows = Vec::with_capacity(input.rows.len());
    for row in &input.rows {
        let rowctx = RowCtx { names: &input.names, cells: &row.cells };
        let mut cells = Vec::with_capacity(col_plan.len());
        for plan in &col_plan {
            cells.push(match plan {
                ColPlan::Direct(pos) => row.cells[*pos].clone(),
                ColPlan::Expr(e) => eval_expr(arena, &rowctx, *e)?,
            });
        }
        rows.push(Row::new(cells));
    }

    Ok(NodeOutput { names, types, rows })
}

enum ColPlan {
    Direct(usize),
    Expr(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::select::JoinInfo;
    use crate::table::Table;

    fn seed_db() -> Database {
        let mut db = Database::new("test");
        let mut u = Table::new("u");
        u.add_column(Column::new("id", CellType::Int));
        u.insert_row(Row::new(vec![Cell::int(1)])).unwrap();
        u.insert_row(Row::new(vec![Cell::int(2)])).unwrap();
        db.create_table(u).unwrap();

        let mut o = Table::new("o");
        o.add_column(Column::new("uid", CellType::Int));
        o.add_column(Column::new("amt", CellType::Int));
        o.insert_row(Row::new(vec![Cell::int(1), Cell::int(10)])).unwrap();
        o.insert_row(Row::new(vec![Cell::int(1), Cell::int(20)])).unwrap();
        db.create_table(o).unwrap();
        db
    }

    #[test]
    fn inner_join_on_equality_merges_rows() {
        let mut db = seed_db();
        let mut arena = Arena::new();
        let mut q = QuerySelect::new();
        q.from_table = Some("u".to_string());

        let rhs_expr = arena.exprs.push(crate::ir::expr::Expr::ColumnRef("o.uid".to_string()));
        let mut cmp = crate::ir::condition::Compare::new("u.id", crate::ir::condition::CmpOp::Eq);
        cmp.rhs_expr = rhs_expr;
        let on_cond = arena.conditions.push(Condition::Compare(cmp));

        let mut join = JoinInfo::new(JoinType::Inner, "o");
        join.on = on_cond;
        let join_idx = arena.joins.push(join);
        q.joins.push(join_idx);

        let sc = arena.select_cols.push(SelectColumn::Star { table_alias: None });
        q.columns.push(sc);

        let mut runner = |_: &mut Database, _: &str| -> Result<Rows> { unreachable!("no lateral in this test") };
        let result = exec_select(&mut db, &arena, &q, &mut runner).unwrap();
        assert_eq!(result.rows.len(), 2);
    }
}
