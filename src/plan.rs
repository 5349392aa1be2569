//! Plan tree (§3 "Plan node", §4.12) and the rule-based planner that
//! builds one from a [`crate::ir::statement::QuerySelect`].
//!
//! Plan nodes are pooled in `Arena::plan_nodes`, one `u32` per node; `left`
//! and `right` name child nodes the same way expressions name their
//! operands. Per §9 ("Dynamic dispatch across operators") the operator set
//! is a closed tagged enum (`PlanOp`) dispatched by `match`, not an open
//! trait object hierarchy — there is a fixed, small vocabulary of physical
//! operators and no plugin mechanism for more.

use crate::arena::{Arena, IDX_NONE};
use crate::database::Database;
use crate::ir::condition::Condition;
use crate::ir::select::{OrderByItem, SelectColumn};
use crate::ir::statement::QuerySelect;

#[derive(Debug, Clone)]
pub enum PlanOp {
    SeqScan {
        table: String,
        /// Output column index -> table column index.
        col_map: Vec<usize>,
    },
    IndexScan {
        table: String,
        index: String,
        /// Index into `conditions`; always an `=` compare on the indexed
        /// column (§4.12).
        cond: u32,
    },
    /// Index into `conditions`.
    Filter {
        cond: u32,
    },
    Project {
        col_map: Vec<usize>,
        output_names: Vec<String>,
    },
    ExprProject {
        /// Indices into `exprs`.
        exprs: Vec<u32>,
        output_names: Vec<String>,
    },
    Limit {
        offset: u64,
        limit: Option<u64>,
    },
    Sort {
        keys: Vec<String>,
        desc: Vec<bool>,
        nulls_first: Vec<Option<bool>>,
    },
    Distinct,
    GenerateSeries {
        start: i64,
        stop: i64,
        step: i64,
        is_bigint: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

/// One node of the plan tree. `left`/`right` are `IDX_NONE` when unused
/// (a leaf scan has neither; most operators have only `left`).
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub op: PlanOp,
    pub left: u32,
    pub right: u32,
    /// Row-count estimate; a hint only (§3), never load-bearing for
    /// correctness.
    pub row_count_hint: u64,
}

impl PlanNode {
    pub fn leaf(op: PlanOp) -> Self {
        PlanNode { op, left: IDX_NONE, right: IDX_NONE, row_count_hint: 0 }
    }

    pub fn unary(op: PlanOp, child: u32) -> Self {
        PlanNode { op, left: child, right: IDX_NONE, row_count_hint: 0 }
    }

    /// One-line renderer used by [`explain`] (§4.12 "Explain").
    pub fn describe(&self) -> String {
        match &self.op {
            PlanOp::SeqScan { table, .. } => format!("Seq Scan on {table}"),
            PlanOp::IndexScan { table, index, .. } => format!("Index Scan using {index} on {table}"),
            PlanOp::Filter { .. } => "Filter".to_string(),
            PlanOp::Project { output_names, .. } => format!("Project ({})", output_names.join(", ")),
            PlanOp::ExprProject { .. } => "Expr Project".to_string(),
            PlanOp::Limit { limit, offset } => format!("Limit (offset={offset}, limit={limit:?})"),
            PlanOp::Sort { keys, .. } => format!("Sort ({})", keys.join(", ")),
            PlanOp::Distinct => "HashAggregate (Distinct)".to_string(),
            PlanOp::GenerateSeries { start, stop, step, .. } => {
                format!("Function Scan on generate_series({start}, {stop}, {step})")
            }
        }
    }
}

/// Render the plan rooted at `root` as an indented tree, matching
/// PostgreSQL's `EXPLAIN` style (§4.12).
pub fn explain(arena: &Arena, root: u32) -> String {
    let mut out = String::new();
    explain_node(arena, root, 0, &mut out);
    out
}

fn explain_node(arena: &Arena, idx: u32, depth: usize, out: &mut String) {
    if idx == IDX_NONE {
        return;
    }
    let node = arena.plan_nodes.get(idx);
    out.push_str(&"  ".repeat(depth));
    out.push_str(&node.describe());
    out.push('\n');
    explain_node(arena, node.left, depth + 1, out);
    explain_node(arena, node.right, depth + 1, out);
}

/// Attempt to translate a `QuerySelect` into a plan tree. Returns `None`
/// when the query falls outside the planner's shape vocabulary, in which
/// case the dispatcher falls back to the legacy row executor (§4.12,
/// §4.14 step 4).
///
/// Shapes are tried in the order listed in §4.12; the first one whose
/// preconditions hold wins. This function handles shape 6, the general
/// single-table pipeline (scan/index-scan, filter, sort, project, distinct,
/// limit); joins, group-by, window functions and set operations always
/// defer to the legacy executor (§4.14 step 4: "if the query has joins, use
/// legacy `exec_join`").
pub fn build_select(arena: &mut Arena, db: &Database, q: &QuerySelect) -> Option<u32> {
    if q.has_joins() {
        return None;
    }
    if !q.ctes.is_empty() {
        return None;
    }
    let table = q.from_table.clone()?;
    if q.from_subquery_sql.is_some() {
        return None;
    }
    // GROUP BY / aggregates / window functions (shapes 3 and 5) and set
    // operations (shape 4) fall outside this function's vocabulary; the
    // dispatcher routes them to the legacy row executor instead (see
    // DESIGN.md).
    if !q.group_by.is_empty() || q.having != IDX_NONE {
        return None;
    }
    if !q.collect_aggregates(arena).is_empty() || !q.collect_windows(arena).is_empty() {
        return None;
    }

    let where_cond = if q.where_cond == IDX_NONE { None } else { Some(q.where_cond) };

    // Shape 6 leaf: INDEX_SCAN when the WHERE clause is a lone `col =
    // literal` on an indexed column (§4.12 row 2), SEQ_SCAN otherwise.
    let mut node = match where_cond.and_then(|c| try_index_scan(arena, db, &table, c)) {
        Some((scan_node, remaining_cond)) => match remaining_cond {
            None => scan_node,
            Some(cond) => arena.plan_nodes.push(PlanNode::unary(PlanOp::Filter { cond }, scan_node)),
        },
        None => {
            let mut node = arena.plan_nodes.push(PlanNode::leaf(PlanOp::SeqScan { table, col_map: Vec::new() }));
            if let Some(cond) = where_cond {
                node = arena.plan_nodes.push(PlanNode::unary(PlanOp::Filter { cond }, node));
            }
            node
        }
    };

    if !q.order_by.is_empty() {
        let (keys, desc, nulls_first) = order_by_to_sort_keys(arena, &q.order_by);
        node = arena.plan_nodes.push(PlanNode::unary(PlanOp::Sort { keys, desc, nulls_first }, node));
    }

    node = build_projection(arena, db, q.from_table.as_deref()?, q, node)?;

    if q.distinct {
        node = arena.plan_nodes.push(PlanNode::unary(PlanOp::Distinct, node));
    }

    if q.limit.is_some() || q.offset.is_some() {
        node = arena.plan_nodes.push(PlanNode::unary(
            PlanOp::Limit { offset: q.offset.unwrap_or(0).max(0) as u64, limit: q.limit.map(|l| l.max(0) as u64) },
            node,
        ));
    }

    Some(node)
}

/// Map the `SELECT` list onto the scan's output columns, producing either a
/// plain `PROJECT` (every item a bare column or `*`) or an `EXPR_PROJECT`
/// (every item a general expression). A select list mixing the two shapes
/// falls outside this function's vocabulary — shape 6 then declines
/// entirely and the dispatcher falls back to the legacy executor, which
/// already projects mixed lists correctly (§4.13).
fn build_projection(arena: &mut Arena, db: &Database, table: &str, q: &QuerySelect, child: u32) -> Option<u32> {
    let t = db.find_table(table)?;
    let all_plain = q.columns.iter().all(|&idx| {
        matches!(arena.select_cols.get(idx), SelectColumn::Star { .. } | SelectColumn::ColumnRef { .. })
    });

    if all_plain {
        let mut col_map = Vec::new();
        let mut output_names = Vec::new();
        for &idx in &q.columns {
            match arena.select_cols.get(idx).clone() {
                SelectColumn::Star { .. } => {
                    for (i, c) in t.columns.iter().enumerate() {
                        col_map.push(i);
                        output_names.push(c.name.clone());
                    }
                }
                SelectColumn::ColumnRef { name, alias, .. } => {
                    let pos = t.find_column(&name)?;
                    col_map.push(pos);
                    output_names.push(alias.unwrap_or(name));
                }
                _ => unreachable!("filtered to plain columns above"),
            }
        }
        return Some(arena.plan_nodes.push(PlanNode::unary(PlanOp::Project { col_map, output_names }, child)));
    }

    let all_expr = q.columns.iter().all(|&idx| matches!(arena.select_cols.get(idx), SelectColumn::Expr { .. }));
    if all_expr {
        let mut exprs = Vec::new();
        let mut output_names = Vec::new();
        for (i, &idx) in q.columns.iter().enumerate() {
            match arena.select_cols.get(idx).clone() {
                SelectColumn::Expr { select_expr, alias } => {
                    let e = arena.select_exprs.get(select_expr).expr;
                    exprs.push(e);
                    output_names.push(alias.unwrap_or_else(|| format!("column{}", i + 1)));
                }
                _ => unreachable!("filtered to expr columns above"),
            }
        }
        return Some(arena.plan_nodes.push(PlanNode::unary(PlanOp::ExprProject { exprs, output_names }, child)));
    }

    None
}

/// Shared with the dispatcher's set-op ORDER BY fix-up (§4.14 step 6),
/// which sorts the combined result of a `UNION`/`INTERSECT`/`EXCEPT` chain
/// after the fact rather than through a plan-level `Sort` node.
pub(crate) fn order_by_to_sort_keys(arena: &Arena, order_by: &[u32]) -> (Vec<String>, Vec<bool>, Vec<Option<bool>>) {
    let mut keys = Vec::with_capacity(order_by.len());
    let mut desc = Vec::with_capacity(order_by.len());
    let mut nulls_first = Vec::with_capacity(order_by.len());
    for &idx in order_by {
        let item: &OrderByItem = arena.order_items.get(idx);
        keys.push(item.column.clone());
        desc.push(item.desc);
        nulls_first.push(item.nulls_first);
    }
    (keys, desc, nulls_first)
}

/// Attempt to use an index for shape 6's leaf scan (§4.12 row 2): only
/// when the entire `WHERE` clause is a single `col = literal` compare on
/// an indexed column. Returns the built `INDEX_SCAN` node and `None` for
/// "no further filtering needed" — the index lookup already satisfies the
/// whole condition exactly, so there is nothing left for a `Filter` node
/// to do.
fn try_index_scan(arena: &mut Arena, db: &Database, table: &str, cond: u32) -> Option<(u32, Option<u32>)> {
    let (col, _literal) = equality_literal_column(arena, cond)?;
    let col = col.to_string();
    let t = db.find_table(table)?;
    let col_pos = t.find_column(&col)?;
    let index = t.indexes.iter().find(|i| i.column_indices == [col_pos])?;
    let node = arena.plan_nodes.push(PlanNode::leaf(PlanOp::IndexScan {
        table: table.to_string(),
        index: index.name.clone(),
        cond,
    }));
    Some((node, None))
}

/// Whether `cond` is a lone `col = literal` compare, the shape that makes
/// `INDEX_SCAN` applicable (§4.12 row 2, planner shape 6 parenthetical).
pub fn equality_literal_column(arena: &Arena, cond: u32) -> Option<(&str, u32)> {
    if cond == IDX_NONE {
        return None;
    }
    match arena.conditions.get(cond) {
        Condition::Compare(cmp) if cmp.op == crate::ir::condition::CmpOp::Eq && cmp.literal != IDX_NONE && cmp.lhs_expr == IDX_NONE => {
            Some((cmp.column.as_str(), cmp.literal))
        }
        _ => None,
    }
}
