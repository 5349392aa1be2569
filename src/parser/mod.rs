//! `sql → IR` (§1 "Out of scope" names the grammar details as an external
//! collaborator; this module is the concrete function that plays that
//! role for this crate, since an embeddable engine has nowhere else to
//! get one). Recursive-descent over the tokens from [`lexer`], building
//! directly into [`crate::arena::Arena`]'s pools rather than an
//! intermediate tree — there is no separate "parse tree" type, matching
//! §9's preference for flat pools over pointer-linked ASTs.
//!
//! Subquery bodies (`(SELECT ...)` in `IN`, `EXISTS`, scalar-compare,
//! `FROM`, `LATERAL`, and CTE definitions) are captured as verbatim source
//! substrings rather than recursively parsed here, per §3 "Subqueries hold
//! a string index pointing at captured SQL text" — the dispatcher
//! re-parses and executes them at resolution/materialization time (§4.6,
//! §4.5).

mod lexer;

use lexer::{tokenize, TokKind, Token};

use crate::arena::{Arena, IDX_NONE};
use crate::cell::{Cell, CellType};
use crate::error::{MskqlError, Result};
use crate::ir::condition::{CmpOp, Compare, Condition};
use crate::ir::expr::{BinOp, CaseWhenBranch, Expr, Func, UnaryOp};
use crate::ir::select::{
    AggExpr, AggFunc, CteDef, FrameBound, JoinInfo, JoinType, OrderByItem, SelectColumn, SelectExpr, SetClause,
    WindowExpr, WindowFrame, WindowFunc,
};
use crate::ir::statement::{
    AlterAction, ColumnDef, CreateTableStmt, DeleteStmt, InsertSource, InsertStmt, Query, QuerySelect, SetOpKind,
    UpdateStmt,
};

/// Parse one SQL statement (a trailing `;` is tolerated and ignored).
pub fn parse_sql<'a>(arena: &mut Arena<'a>, sql: &str) -> Result<Query> {
    let toks = tokenize(sql)?;
    let mut p = Parser { src: sql, toks, pos: 0, arena };
    let stmt = p.parse_statement()?;
    p.skip_punct(";");
    if !p.at_eof() {
        return Err(MskqlError::Syntax(format!("trailing input after statement: {:?}", p.peek().kind)));
    }
    Ok(stmt)
}

struct Parser<'p, 'a> {
    src: &'p str,
    toks: Vec<Token>,
    pos: usize,
    arena: &'p mut Arena<'a>,
}

const FOLLOW_SET: &[&str] = &[
    "from", "where", "group", "having", "order", "limit", "offset", "union", "intersect", "except", "returning",
    "on", "using", "join", "inner", "left", "right", "full", "cross", "natural", "lateral", "and", "or", "as",
];

impl<'p, 'a> Parser<'p, 'a> {
    fn peek(&self) -> &Token {
        &self.toks[self.pos]
    }

    fn peek_at(&self, off: usize) -> &Token {
        self.toks.get(self.pos + off).unwrap_or_else(|| self.toks.last().unwrap())
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn is_kw(&self, word: &str) -> bool {
        self.peek().is_ident(word)
    }

    fn is_kw_at(&self, off: usize, word: &str) -> bool {
        self.peek_at(off).is_ident(word)
    }

    fn eat_kw(&mut self, word: &str) -> bool {
        if self.is_kw(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, word: &str) -> Result<()> {
        if self.eat_kw(word) {
            Ok(())
        } else {
            Err(MskqlError::Syntax(format!("expected '{}', found {:?}", word.to_uppercase(), self.peek().kind)))
        }
    }

    fn skip_punct(&mut self, p: &str) -> bool {
        if self.peek().is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<()> {
        if self.skip_punct(p) {
            Ok(())
        } else {
            Err(MskqlError::Syntax(format!("expected '{}', found {:?}", p, self.peek().kind)))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.advance().kind {
            TokKind::Ident(s) => Ok(s),
            other => Err(MskqlError::Syntax(format!("expected identifier, found {:?}", other))),
        }
    }

    /// Qualified name: `a.b.c` joined back with dots (schema-qualification
    /// is accepted but not meaningful — this is a single-schema engine).
    fn expect_qualified_ident(&mut self) -> Result<String> {
        let mut name = self.expect_ident()?;
        while self.peek().is_punct(".") && matches!(self.peek_at(1).kind, TokKind::Ident(_)) {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    /// Captures the verbatim source text strictly between a `(` already
    /// consumed and its matching `)`, advancing past the `)`.
    fn capture_balanced_parens(&mut self) -> Result<String> {
        let mut depth: i32 = 1;
        let inner_start = self.peek().start;
        let mut inner_end = inner_start;
        loop {
            if self.at_eof() {
                return Err(MskqlError::Syntax("unterminated parenthesis".to_string()));
            }
            if self.peek().is_punct("(") {
                depth += 1;
            } else if self.peek().is_punct(")") {
                depth -= 1;
                if depth == 0 {
                    inner_end = self.peek().start;
                    self.advance();
                    break;
                }
            }
            self.advance();
        }
        Ok(self.src[inner_start..inner_end].trim().to_string())
    }

    // ---------------------------------------------------------------
    // Statement dispatch
    // ---------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Query> {
        if self.eat_kw("with") {
            return self.parse_with();
        }
        if self.is_kw("select") {
            return self.parse_set_op_chain();
        }
        if self.eat_kw("insert") {
            return self.parse_insert();
        }
        if self.eat_kw("update") {
            return self.parse_update();
        }
        if self.eat_kw("delete") {
            return self.parse_delete();
        }
        if self.eat_kw("create") {
            return self.parse_create();
        }
        if self.eat_kw("drop") {
            return self.parse_drop();
        }
        if self.eat_kw("alter") {
            return self.parse_alter();
        }
        if self.eat_kw("begin") {
            self.eat_kw("transaction");
            return Ok(Query::Begin);
        }
        if self.eat_kw("commit") {
            self.eat_kw("transaction");
            return Ok(Query::Commit);
        }
        if self.eat_kw("rollback") {
            self.eat_kw("transaction");
            return Ok(Query::Rollback);
        }
        Err(MskqlError::Syntax(format!("unsupported statement starting at {:?}", self.peek().kind)))
    }

    fn parse_with(&mut self) -> Result<Query> {
        let recursive = self.eat_kw("recursive");
        let mut ctes = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let mut column_names = Vec::new();
            if self.skip_punct("(") {
                loop {
                    column_names.push(self.expect_ident()?);
                    if !self.skip_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
            }
            self.expect_kw("as")?;
            self.expect_punct("(")?;
            let body = self.capture_balanced_parens()?;
            let sql_idx = self.arena.store_string(body);
            let cte_idx = self.arena.ctes.push(CteDef { name, recursive, column_names, sql: sql_idx });
            ctes.push(cte_idx);
            if !self.skip_punct(",") {
                break;
            }
        }
        let mut query = self.parse_set_op_chain()?;
        attach_ctes(&mut query, ctes);
        Ok(query)
    }

    /// `SELECT ... [UNION|INTERSECT|EXCEPT [ALL] SELECT ...]*`, left
    /// associative.
    fn parse_set_op_chain(&mut self) -> Result<Query> {
        let mut lhs = Query::Select(self.parse_select_body()?);
        loop {
            let op = if self.eat_kw("union") {
                SetOpKind::Union
            } else if self.eat_kw("intersect") {
                SetOpKind::Intersect
            } else if self.eat_kw("except") {
                SetOpKind::Except
            } else {
                break;
            };
            let all = self.eat_kw("all");
            let rhs = Query::Select(self.parse_select_body()?);
            lhs = Query::SetOp { op, all, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    // ---------------------------------------------------------------
    // SELECT
    // ---------------------------------------------------------------

    fn parse_select_body(&mut self) -> Result<QuerySelect> {
        self.expect_kw("select")?;
        let mut q = QuerySelect::new();
        q.distinct = self.eat_kw("distinct");

        loop {
            let col = self.parse_select_column()?;
            q.columns.push(col);
            if !self.skip_punct(",") {
                break;
            }
        }

        if self.eat_kw("from") {
            self.parse_from(&mut q)?;
        }

        if self.eat_kw("where") {
            q.where_cond = self.parse_or_condition()?;
        }

        if self.eat_kw("group") {
            self.expect_kw("by")?;
            loop {
                q.group_by.push(self.expect_qualified_ident()?);
                if !self.skip_punct(",") {
                    break;
                }
            }
        }

        if self.eat_kw("having") {
            q.having = self.parse_or_condition()?;
        }

        if self.eat_kw("order") {
            self.expect_kw("by")?;
            loop {
                let item = self.parse_order_by_item()?;
                q.order_by.push(self.arena.order_items.push(item));
                if !self.skip_punct(",") {
                    break;
                }
            }
        }

        if self.eat_kw("limit") {
            q.limit = Some(self.parse_integer_literal()?);
        }
        if self.eat_kw("offset") {
            q.offset = Some(self.parse_integer_literal()?);
        }

        Ok(q)
    }

    fn parse_integer_literal(&mut self) -> Result<i64> {
        match self.advance().kind {
            TokKind::Number(s) => s.parse::<i64>().map_err(|_| MskqlError::Syntax(format!("invalid integer literal '{s}'"))),
            other => Err(MskqlError::Syntax(format!("expected integer literal, found {:?}", other))),
        }
    }

    /// An optionally negated integer literal, for `generate_series`'s
    /// bounds — the lexer tokenizes a leading `-` as its own punct rather
    /// than folding it into the number.
    fn parse_signed_integer_literal(&mut self) -> Result<i64> {
        let neg = self.skip_punct("-");
        let v = self.parse_integer_literal()?;
        Ok(if neg { -v } else { v })
    }

    fn parse_order_by_item(&mut self) -> Result<OrderByItem> {
        let column = self.expect_qualified_ident()?;
        let desc = if self.eat_kw("asc") {
            false
        } else {
            self.eat_kw("desc")
        };
        let nulls_first = if self.eat_kw("nulls") {
            if self.eat_kw("first") {
                Some(true)
            } else {
                self.expect_kw("last")?;
                Some(false)
            }
        } else {
            None
        };
        Ok(OrderByItem { column, desc, nulls_first })
    }

    fn parse_from(&mut self, q: &mut QuerySelect) -> Result<()> {
        if self.skip_punct("(") {
            let body = self.capture_balanced_parens()?;
            let sql_idx = self.arena.store_string(body);
            q.from_subquery_sql = Some(sql_idx);
            self.eat_kw("as");
            q.from_alias = Some(self.expect_ident()?);
        } else if self.is_kw("generate_series") && self.peek_at(1).is_punct("(") {
            self.advance();
            self.expect_punct("(")?;
            let start = self.parse_signed_integer_literal()?;
            self.expect_punct(",")?;
            let stop = self.parse_signed_integer_literal()?;
            let step = if self.skip_punct(",") { self.parse_signed_integer_literal()? } else { 1 };
            self.expect_punct(")")?;
            q.generate_series = Some((start, stop, step));
            if self.eat_kw("as") {
                q.from_alias = Some(self.expect_ident()?);
            } else if let TokKind::Ident(name) = &self.peek().kind {
                if !FOLLOW_SET.iter().any(|k| name.eq_ignore_ascii_case(k)) {
                    q.from_alias = Some(self.expect_ident()?);
                }
            }
        } else {
            let table = self.expect_qualified_ident()?;
            q.from_table = Some(table);
            if self.eat_kw("as") {
                q.from_alias = Some(self.expect_ident()?);
            } else if let TokKind::Ident(name) = &self.peek().kind {
                if !FOLLOW_SET.iter().any(|k| name.eq_ignore_ascii_case(k)) {
                    q.from_alias = Some(self.expect_ident()?);
                }
            }
        }

        while self.at_join_start() {
            let join_idx = self.parse_join()?;
            q.joins.push(join_idx);
        }
        Ok(())
    }

    fn at_join_start(&self) -> bool {
        self.is_kw("join")
            || self.is_kw("inner")
            || self.is_kw("left")
            || self.is_kw("right")
            || self.is_kw("full")
            || self.is_kw("cross")
            || self.is_kw("natural")
    }

    fn parse_join(&mut self) -> Result<u32> {
        let natural = self.eat_kw("natural");
        let join_type = if self.eat_kw("inner") {
            JoinType::Inner
        } else if self.eat_kw("left") {
            self.eat_kw("outer");
            JoinType::Left
        } else if self.eat_kw("right") {
            self.eat_kw("outer");
            JoinType::Right
        } else if self.eat_kw("full") {
            self.eat_kw("outer");
            JoinType::Full
        } else if self.eat_kw("cross") {
            JoinType::Cross
        } else {
            JoinType::Inner
        };
        self.expect_kw("join")?;

        let lateral = self.eat_kw("lateral");
        let mut join = if lateral {
            self.expect_punct("(")?;
            let body = self.capture_balanced_parens()?;
            let sql_idx = self.arena.store_string(body);
            let mut j = JoinInfo::new(join_type, String::new());
            j.lateral_sql = Some(sql_idx);
            j
        } else {
            let table = self.expect_qualified_ident()?;
            JoinInfo::new(join_type, table)
        };
        join.natural = natural;

        if self.eat_kw("as") {
            join.alias = Some(self.expect_ident()?);
        } else if let TokKind::Ident(name) = &self.peek().kind {
            if !FOLLOW_SET.iter().any(|k| name.eq_ignore_ascii_case(k)) {
                join.alias = Some(self.expect_ident()?);
            }
        }

        if self.eat_kw("on") {
            join.on = self.parse_or_condition()?;
        } else if self.eat_kw("using") {
            self.expect_punct("(")?;
            loop {
                join.using.push(self.expect_ident()?);
                if !self.skip_punct(",") {
                    break;
                }
            }
            self.expect_punct(")")?;
        }

        Ok(self.arena.joins.push(join))
    }

    // ---------------------------------------------------------------
    // SELECT column list: column-ref / `*` / expression / aggregate /
    // window function, each with an optional alias (§6).
    // ---------------------------------------------------------------

    fn parse_select_column(&mut self) -> Result<u32> {
        if self.peek().is_punct("*") {
            self.advance();
            return Ok(self.arena.select_cols.push(SelectColumn::Star { table_alias: None }));
        }
        if let TokKind::Ident(name) = &self.peek().kind {
            if self.peek_at(1).is_punct(".") && self.peek_at(2).is_punct("*") {
                let alias = name.clone();
                self.advance();
                self.advance();
                self.advance();
                return Ok(self.arena.select_cols.push(SelectColumn::Star { table_alias: Some(alias) }));
            }
        }

        if let Some(func) = self.peek_agg_func() {
            if self.peek_at(1).is_punct("(") {
                return self.parse_agg_or_window_column(func);
            }
        }
        if let Some(func) = self.peek_window_only_func() {
            if self.peek_at(1).is_punct("(") {
                return self.parse_window_only_column(func);
            }
        }

        // Bare column reference: `name`, `alias.name` — kept distinct
        // from a general `Expr` so later projection can copy cells
        // directly rather than re-evaluating (§4.8 "copies cells by
        // matched column name").
        if let TokKind::Ident(_) = &self.peek().kind {
            let save = self.pos;
            if let Ok((table_alias, name)) = self.try_parse_bare_column_ref() {
                if !self.peek().is_punct("(") {
                    let alias = self.parse_optional_alias()?;
                    return Ok(self.arena.select_cols.push(SelectColumn::ColumnRef { table_alias, name, alias }));
                }
            }
            self.pos = save;
        }

        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;
        let se = self.arena.select_exprs.push(SelectExpr { expr });
        Ok(self.arena.select_cols.push(SelectColumn::Expr { select_expr: se, alias }))
    }

    fn try_parse_bare_column_ref(&mut self) -> Result<(Option<String>, String)> {
        let first = self.expect_ident()?;
        if self.peek().is_punct(".") && matches!(self.peek_at(1).kind, TokKind::Ident(_)) {
            self.advance();
            let second = self.expect_ident()?;
            Ok((Some(first), second))
        } else {
            Ok((None, first))
        }
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.eat_kw("as") {
            return Ok(Some(self.expect_ident()?));
        }
        if let TokKind::Ident(name) = &self.peek().kind {
            if !FOLLOW_SET.iter().any(|k| name.eq_ignore_ascii_case(k)) {
                return Ok(Some(self.expect_ident()?));
            }
        }
        Ok(None)
    }

    fn peek_agg_func(&self) -> Option<AggFunc> {
        match self.peek().ident_text()?.to_ascii_lowercase().as_str() {
            "count" => Some(AggFunc::Count),
            "sum" => Some(AggFunc::Sum),
            "avg" => Some(AggFunc::Avg),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            _ => None,
        }
    }

    fn peek_window_only_func(&self) -> Option<WindowFunc> {
        match self.peek().ident_text()?.to_ascii_lowercase().as_str() {
            "row_number" => Some(WindowFunc::RowNumber),
            "rank" => Some(WindowFunc::Rank),
            "dense_rank" => Some(WindowFunc::DenseRank),
            "ntile" => Some(WindowFunc::Ntile),
            "percent_rank" => Some(WindowFunc::PercentRank),
            "cume_dist" => Some(WindowFunc::CumeDist),
            "lag" => Some(WindowFunc::Lag),
            "lead" => Some(WindowFunc::Lead),
            "first_value" => Some(WindowFunc::FirstValue),
            "last_value" => Some(WindowFunc::LastValue),
            "nth_value" => Some(WindowFunc::NthValue),
            _ => None,
        }
    }

    /// `MIN`/`MAX` have no window-function counterpart in this engine's
    /// `WindowFunc` set (§4.12 only defines `Sum`/`Count`/`Avg` there).
    fn agg_to_window_func(func: AggFunc) -> Result<WindowFunc> {
        match func {
            AggFunc::Count => Ok(WindowFunc::Count),
            AggFunc::Sum => Ok(WindowFunc::Sum),
            AggFunc::Avg => Ok(WindowFunc::Avg),
            AggFunc::Min | AggFunc::Max => {
                Err(MskqlError::Syntax("MIN()/MAX() cannot be used as a window function".to_string()))
            }
        }
    }

    /// `COUNT(*)`/`SUM(expr)`/... — either a plain aggregate or, with a
    /// trailing `OVER (...)`, the corresponding window function (§4.12
    /// `WindowFunc::{Sum,Count,Avg}`).
    fn parse_agg_or_window_column(&mut self, func: AggFunc) -> Result<u32> {
        self.advance(); // function name
        self.expect_punct("(")?;
        let distinct = self.eat_kw("distinct");
        let arg = if func == AggFunc::Count && self.peek().is_punct("*") {
            self.advance();
            IDX_NONE
        } else {
            self.parse_expr()?
        };
        self.expect_punct(")")?;

        if self.eat_kw("over") {
            let wfunc = Self::agg_to_window_func(func)?;
            let mut w = WindowExpr::new(wfunc);
            w.arg = arg;
            self.parse_over_clause(&mut w)?;
            let widx = self.arena.window_exprs.push(w);
            let alias = self.parse_optional_alias()?;
            return Ok(self.arena.select_cols.push(SelectColumn::Window { window: widx, alias }));
        }

        let agg = self.arena.aggregates.push(AggExpr { func, arg, distinct });
        let alias = self.parse_optional_alias()?;
        Ok(self.arena.select_cols.push(SelectColumn::Aggregate { agg, alias }))
    }

    /// `ROW_NUMBER()`/`RANK()`/`LAG(expr[, n[, default]])`/... — always a
    /// window function, never a plain aggregate.
    fn parse_window_only_column(&mut self, func: WindowFunc) -> Result<u32> {
        self.advance();
        self.expect_punct("(")?;
        let mut w = WindowExpr::new(func);
        if !self.peek().is_punct(")") {
            w.arg = self.parse_expr()?;
            if self.skip_punct(",") {
                w.extra_arg = Some(self.parse_integer_literal()?);
                if self.skip_punct(",") {
                    w.default_expr = self.parse_expr()?;
                }
            }
        }
        self.expect_punct(")")?;
        self.expect_kw("over")?;
        self.parse_over_clause(&mut w)?;
        let widx = self.arena.window_exprs.push(w);
        let alias = self.parse_optional_alias()?;
        Ok(self.arena.select_cols.push(SelectColumn::Window { window: widx, alias }))
    }

    fn parse_over_clause(&mut self, w: &mut WindowExpr) -> Result<()> {
        self.expect_punct("(")?;
        if self.eat_kw("partition") {
            self.expect_kw("by")?;
            loop {
                w.partition_by.push(self.expect_qualified_ident()?);
                if !self.skip_punct(",") {
                    break;
                }
            }
        }
        if self.eat_kw("order") {
            self.expect_kw("by")?;
            loop {
                w.order_by.push(self.parse_order_by_item()?);
                if !self.skip_punct(",") {
                    break;
                }
            }
        }
        if self.is_kw("rows") || self.is_kw("range") {
            self.advance();
            w.frame = Some(self.parse_frame()?);
        }
        self.expect_punct(")")?;
        Ok(())
    }

    fn parse_frame(&mut self) -> Result<WindowFrame> {
        if self.eat_kw("between") {
            let start = self.parse_frame_bound()?;
            self.expect_kw("and")?;
            let end = self.parse_frame_bound()?;
            Ok(WindowFrame { start, end })
        } else {
            let start = self.parse_frame_bound()?;
            Ok(WindowFrame { start, end: FrameBound::CurrentRow })
        }
    }

    fn parse_frame_bound(&mut self) -> Result<FrameBound> {
        if self.eat_kw("unbounded") {
            if self.eat_kw("preceding") {
                return Ok(FrameBound::UnboundedPreceding);
            }
            self.expect_kw("following")?;
            return Ok(FrameBound::UnboundedFollowing);
        }
        if self.eat_kw("current") {
            self.expect_kw("row")?;
            return Ok(FrameBound::CurrentRow);
        }
        let n = self.parse_integer_literal()? as u32;
        if self.eat_kw("preceding") {
            Ok(FrameBound::Preceding(n))
        } else {
            self.expect_kw("following")?;
            Ok(FrameBound::Following(n))
        }
    }

    // ---------------------------------------------------------------
    // Condition grammar: OR > AND > NOT > predicate (§3 "Condition tree").
    // ---------------------------------------------------------------

    fn parse_or_condition(&mut self) -> Result<u32> {
        let mut lhs = self.parse_and_condition()?;
        while self.eat_kw("or") {
            let rhs = self.parse_and_condition()?;
            lhs = self.arena.conditions.push(Condition::Or(lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_and_condition(&mut self) -> Result<u32> {
        let mut lhs = self.parse_not_condition()?;
        while self.eat_kw("and") {
            let rhs = self.parse_not_condition()?;
            lhs = self.arena.conditions.push(Condition::And(lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_not_condition(&mut self) -> Result<u32> {
        if self.eat_kw("not") {
            let inner = self.parse_not_condition()?;
            return Ok(self.arena.conditions.push(Condition::Not(inner)));
        }
        self.parse_condition_atom()
    }

    fn parse_condition_atom(&mut self) -> Result<u32> {
        if self.eat_kw("exists") {
            self.expect_punct("(")?;
            let body = self.capture_balanced_parens()?;
            let sql_idx = self.arena.store_string(body);
            let mut cmp = Compare::new(String::new(), CmpOp::Exists);
            cmp.scalar_subquery_sql = sql_idx;
            return Ok(self.arena.conditions.push(Condition::Compare(cmp)));
        }

        // `(a, b) IN ((1, 2), (3, 4))`: a parenthesized column-name list
        // immediately followed by `IN` (row-value membership, §3
        // "Condition tree" `MultiIn`). Any other parenthesized start is a
        // grouped sub-condition.
        if self.peek().is_punct("(") {
            if let Some(cols) = self.try_peek_multi_in_columns() {
                return self.parse_multi_in(cols);
            }
            self.advance();
            let inner = self.parse_or_condition()?;
            self.expect_punct(")")?;
            return self.finish_predicate_after_paren_condition(inner);
        }

        let lhs_expr = self.parse_expr()?;
        self.parse_predicate_tail(lhs_expr)
    }

    /// A grouped condition `(...)` can itself be the LHS of nothing
    /// further in this grammar (booleans don't compare), so this just
    /// returns it — kept as a named seam in case a future grammar
    /// addition needs to inspect what follows a parenthesized predicate.
    fn finish_predicate_after_paren_condition(&mut self, inner: u32) -> Result<u32> {
        Ok(inner)
    }

    fn try_peek_multi_in_columns(&self) -> Option<Vec<String>> {
        let mut i = self.pos;
        debug_assert!(self.toks[i].is_punct("("));
        i += 1;
        let mut cols = Vec::new();
        loop {
            match &self.toks.get(i)?.kind {
                TokKind::Ident(s) => cols.push(s.clone()),
                _ => return None,
            }
            i += 1;
            if self.toks.get(i)?.is_punct(",") {
                i += 1;
                continue;
            }
            break;
        }
        if !self.toks.get(i)?.is_punct(")") {
            return None;
        }
        i += 1;
        if cols.len() < 2 || !self.toks.get(i)?.is_ident("in") {
            return None;
        }
        Some(cols)
    }

    fn parse_multi_in(&mut self, columns: Vec<String>) -> Result<u32> {
        self.expect_punct("(")?;
        for _ in &columns {
            self.expect_ident()?;
            self.skip_punct(",");
        }
        self.expect_punct(")")?;
        self.expect_kw("in")?;
        self.expect_punct("(")?;
        let mut rows = Vec::new();
        loop {
            self.expect_punct("(")?;
            let mut cells = Vec::with_capacity(columns.len());
            loop {
                cells.push(self.parse_literal_cell()?);
                if !self.skip_punct(",") {
                    break;
                }
            }
            self.expect_punct(")")?;
            rows.push(self.arena.push_row(crate::cell::Row::new(cells)));
            if !self.skip_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(self.arena.conditions.push(Condition::MultiIn { columns, rows }))
    }

    fn parse_predicate_tail(&mut self, lhs_expr: u32) -> Result<u32> {
        let mut cmp = match self.arena.exprs.get(lhs_expr) {
            Expr::ColumnRef(name) => Compare::new(name.clone(), CmpOp::Eq),
            _ => {
                let mut c = Compare::new(String::new(), CmpOp::Eq);
                c.lhs_expr = lhs_expr;
                c
            }
        };

        if self.eat_kw("is") {
            let negate = self.eat_kw("not");
            if self.eat_kw("null") {
                cmp.op = if negate { CmpOp::IsNotNull } else { CmpOp::IsNull };
                return Ok(self.arena.conditions.push(Condition::Compare(cmp)));
            }
            self.expect_kw("distinct")?;
            self.expect_kw("from")?;
            let rhs = self.parse_expr()?;
            cmp.op = if negate { CmpOp::IsNotDistinctFrom } else { CmpOp::IsDistinctFrom };
            self.attach_literal_or_expr_rhs(&mut cmp, rhs)?;
            return Ok(self.arena.conditions.push(Condition::Compare(cmp)));
        }

        let negate = self.eat_kw("not");
        if negate || self.is_kw("in") || self.is_kw("between") || self.is_kw("like") || self.is_kw("ilike") {
            if self.eat_kw("in") {
                cmp.op = if negate { CmpOp::NotIn } else { CmpOp::In };
                self.parse_in_rhs(&mut cmp)?;
                return Ok(self.arena.conditions.push(Condition::Compare(cmp)));
            }
            if self.eat_kw("between") {
                cmp.op = CmpOp::Between;
                cmp.literal = self.parse_literal_cell_idx()?;
                self.expect_kw("and")?;
                cmp.between_high = self.parse_literal_cell_idx()?;
                let cond = self.arena.conditions.push(Condition::Compare(cmp));
                return Ok(if negate { self.arena.conditions.push(Condition::Not(cond)) } else { cond });
            }
            if self.eat_kw("like") || self.eat_kw("ilike") {
                cmp.op = CmpOp::Like;
                cmp.literal = self.parse_literal_cell_idx()?;
                let cond = self.arena.conditions.push(Condition::Compare(cmp));
                return Ok(if negate { self.arena.conditions.push(Condition::Not(cond)) } else { cond });
            }
            return Err(MskqlError::Syntax("expected IN/BETWEEN/LIKE after NOT".to_string()));
        }

        cmp.op = if self.skip_punct("=") {
            CmpOp::Eq
        } else if self.skip_punct("<>") || self.skip_punct("!=") {
            CmpOp::Ne
        } else if self.skip_punct("<=") {
            CmpOp::Le
        } else if self.skip_punct(">=") {
            CmpOp::Ge
        } else if self.skip_punct("<") {
            CmpOp::Lt
        } else if self.skip_punct(">") {
            CmpOp::Gt
        } else {
            return Err(MskqlError::Syntax(format!("expected comparison operator, found {:?}", self.peek().kind)));
        };

        if self.eat_kw("any") {
            cmp.op = CmpOp::Any;
            self.expect_punct("(")?;
            self.parse_any_all_values(&mut cmp)?;
            return Ok(self.arena.conditions.push(Condition::Compare(cmp)));
        }
        if self.eat_kw("all") {
            cmp.op = CmpOp::All;
            self.expect_punct("(")?;
            self.parse_any_all_values(&mut cmp)?;
            return Ok(self.arena.conditions.push(Condition::Compare(cmp)));
        }

        if self.peek().is_punct("(") && self.is_kw_at(1, "select") {
            self.advance();
            let body = self.capture_balanced_parens()?;
            cmp.scalar_subquery_sql = self.arena.store_string(body);
            return Ok(self.arena.conditions.push(Condition::Compare(cmp)));
        }

        let rhs = self.parse_expr()?;
        self.attach_literal_or_expr_rhs(&mut cmp, rhs)?;
        Ok(self.arena.conditions.push(Condition::Compare(cmp)))
    }

    /// A comparison RHS that parsed to a literal is stored as `cmp.literal`
    /// (cheap `Cell` reuse); anything else (a column ref or arbitrary
    /// expression, e.g. `JOIN ... ON a.x = b.y`) is stored as
    /// `cmp.rhs_expr` (§3 "Condition tree" `rhs_expr`).
    fn attach_literal_or_expr_rhs(&mut self, cmp: &mut Compare, rhs_expr: u32) -> Result<()> {
        if let Expr::Literal(cell_idx) = self.arena.exprs.get(rhs_expr) {
            cmp.literal = *cell_idx;
        } else {
            cmp.rhs_expr = rhs_expr;
        }
        Ok(())
    }

    fn parse_in_rhs(&mut self, cmp: &mut Compare) -> Result<()> {
        self.expect_punct("(")?;
        if self.is_kw("select") {
            let body = self.capture_balanced_parens_from_current()?;
            cmp.in_subquery_sql = self.arena.store_string(body);
            return Ok(());
        }
        loop {
            cmp.in_values.push(self.parse_literal_cell()?);
            if !self.skip_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(())
    }

    /// Like [`Self::capture_balanced_parens`] but called when the opening
    /// `(` has already been consumed and parsing should resume counting
    /// from depth 1 at the current token (used by `IN (SELECT ...)` where
    /// the caller already ate the `(`).
    fn capture_balanced_parens_from_current(&mut self) -> Result<String> {
        self.capture_balanced_parens()
    }

    fn parse_any_all_values(&mut self, cmp: &mut Compare) -> Result<()> {
        self.eat_kw("array");
        self.skip_punct("[");
        loop {
            cmp.any_all_values.push(self.parse_literal_cell()?);
            if !self.skip_punct(",") {
                break;
            }
        }
        self.skip_punct("]");
        self.expect_punct(")")?;
        Ok(())
    }

    fn parse_literal_cell_idx(&mut self) -> Result<u32> {
        let c = self.parse_literal_cell()?;
        Ok(self.arena.push_cell(c))
    }

    fn parse_literal_cell(&mut self) -> Result<Cell> {
        let e = self.parse_unary()?;
        match self.arena.exprs.get(e) {
            Expr::Literal(idx) => Ok(self.arena.cells.get(*idx).clone()),
            _ => Err(MskqlError::Syntax("expected a literal value".to_string())),
        }
    }

    // ---------------------------------------------------------------
    // Expression grammar: `||` < `+ -` < `* / %` < unary `-` < atoms (§6).
    // ---------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<u32> {
        self.parse_concat()
    }

    fn parse_concat(&mut self) -> Result<u32> {
        let mut lhs = self.parse_additive()?;
        while self.skip_punct("||") {
            let rhs = self.parse_additive()?;
            lhs = self.arena.exprs.push(Expr::BinaryOp { op: BinOp::Concat, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<u32> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.skip_punct("+") {
                BinOp::Add
            } else if self.skip_punct("-") {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            lhs = self.arena.exprs.push(Expr::BinaryOp { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<u32> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.skip_punct("*") {
                BinOp::Mul
            } else if self.skip_punct("/") {
                BinOp::Div
            } else if self.skip_punct("%") {
                BinOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = self.arena.exprs.push(Expr::BinaryOp { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<u32> {
        if self.skip_punct("-") {
            let operand = self.parse_unary()?;
            return Ok(self.arena.exprs.push(Expr::UnaryOp { op: UnaryOp::Neg, operand }));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<u32> {
        if self.skip_punct("(") {
            if self.is_kw("select") {
                let body = self.capture_balanced_parens()?;
                let sql_idx = self.arena.store_string(body);
                return Ok(self.arena.exprs.push(Expr::Subquery { sql: sql_idx }));
            }
            let inner = self.parse_expr()?;
            self.expect_punct(")")?;
            return Ok(inner);
        }

        if self.eat_kw("case") {
            return self.parse_case_when();
        }

        match self.peek().kind.clone() {
            TokKind::Number(text) => {
                self.advance();
                Ok(self.arena.exprs.push(Expr::Literal(self.arena.push_cell(number_cell(&text)))))
            }
            TokKind::Str(s) => {
                self.advance();
                Ok(self.arena.exprs.push(Expr::Literal(self.arena.push_cell(Cell::text(s)))))
            }
            TokKind::Ident(name) => {
                if name.eq_ignore_ascii_case("true") {
                    self.advance();
                    return Ok(self.arena.exprs.push(Expr::Literal(self.arena.push_cell(Cell::boolean(true)))));
                }
                if name.eq_ignore_ascii_case("false") {
                    self.advance();
                    return Ok(self.arena.exprs.push(Expr::Literal(self.arena.push_cell(Cell::boolean(false)))));
                }
                if name.eq_ignore_ascii_case("null") {
                    self.advance();
                    return Ok(self.arena.exprs.push(Expr::Literal(self.arena.push_cell(Cell::null(CellType::Text)))));
                }
                if self.peek_at(1).is_punct("(") {
                    if let Some(func) = builtin_func(&name) {
                        self.advance();
                        self.advance();
                        let mut args = Vec::new();
                        if !self.peek().is_punct(")") {
                            loop {
                                args.push(self.parse_expr()?);
                                if !self.skip_punct(",") {
                                    break;
                                }
                            }
                        }
                        self.expect_punct(")")?;
                        let args_start = self.arena.arg_indices.len() as u32;
                        for a in &args {
                            self.arena.arg_indices.push(*a);
                        }
                        return Ok(self.arena.exprs.push(Expr::FuncCall { func, args_start, args_count: args.len() as u32 }));
                    }
                }
                let (table_alias, col) = self.try_parse_bare_column_ref()?;
                let full = match table_alias {
                    Some(a) => format!("{a}.{col}"),
                    None => col,
                };
                Ok(self.arena.exprs.push(Expr::ColumnRef(full)))
            }
            other => Err(MskqlError::Syntax(format!("unexpected token in expression: {:?}", other))),
        }
    }

    fn parse_case_when(&mut self) -> Result<u32> {
        let branches_start = self.arena.branches.len() as u32;
        let mut count = 0u32;
        loop {
            self.expect_kw("when")?;
            let cond = self.parse_or_condition()?;
            self.expect_kw("then")?;
            let result = self.parse_expr()?;
            self.arena.branches.push(CaseWhenBranch { cond, result });
            count += 1;
            if !self.is_kw("when") {
                break;
            }
        }
        let mut node = Expr::case_when(branches_start, count);
        if self.eat_kw("else") {
            let else_expr = self.parse_expr()?;
            if let Expr::CaseWhen { else_expr: slot, .. } = &mut node {
                *slot = else_expr;
            }
        }
        self.expect_kw("end")?;
        Ok(self.arena.exprs.push(node))
    }

    // ---------------------------------------------------------------
    // INSERT / UPDATE / DELETE
    // ---------------------------------------------------------------

    fn parse_insert(&mut self) -> Result<Query> {
        self.expect_kw("into")?;
        let table = self.expect_qualified_ident()?;
        let mut columns = Vec::new();
        if self.skip_punct("(") {
            loop {
                columns.push(self.expect_ident()?);
                if !self.skip_punct(",") {
                    break;
                }
            }
            self.expect_punct(")")?;
        }

        let source = if self.eat_kw("values") {
            let mut rows = Vec::new();
            loop {
                self.expect_punct("(")?;
                let mut cells = Vec::new();
                loop {
                    if self.eat_kw("default") {
                        cells.push(self.arena.exprs.push(Expr::Literal(self.arena.push_cell(Cell::null(CellType::Text)))));
                    } else {
                        cells.push(self.parse_expr()?);
                    }
                    if !self.skip_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
                rows.push(cells);
                if !self.skip_punct(",") {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else {
            InsertSource::Select(Box::new(self.parse_set_op_chain()?))
        };

        let mut on_conflict_do_nothing = None;
        if self.eat_kw("on") {
            self.expect_kw("conflict")?;
            let mut cols = Vec::new();
            if self.skip_punct("(") {
                loop {
                    cols.push(self.expect_ident()?);
                    if !self.skip_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
            }
            self.expect_kw("do")?;
            self.expect_kw("nothing")?;
            on_conflict_do_nothing = Some(cols);
        }

        let returning = self.parse_optional_returning()?;
        Ok(Query::Insert(InsertStmt { table, columns, source, on_conflict_do_nothing, returning }))
    }

    fn parse_optional_returning(&mut self) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        if self.eat_kw("returning") {
            loop {
                out.push(self.parse_select_column()?);
                if !self.skip_punct(",") {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn parse_update(&mut self) -> Result<Query> {
        let table = self.expect_qualified_ident()?;
        self.expect_kw("set")?;
        let mut set = Vec::new();
        loop {
            let column = self.expect_ident()?;
            self.expect_punct("=")?;
            let expr = self.parse_expr()?;
            set.push(self.arena.set_clauses.push(SetClause { column, expr }));
            if !self.skip_punct(",") {
                break;
            }
        }

        let mut from_table = None;
        let mut from_alias = None;
        if self.eat_kw("from") {
            from_table = Some(self.expect_qualified_ident()?);
            if self.eat_kw("as") {
                from_alias = Some(self.expect_ident()?);
            } else if let TokKind::Ident(name) = &self.peek().kind {
                if !FOLLOW_SET.iter().any(|k| name.eq_ignore_ascii_case(k)) {
                    from_alias = Some(self.expect_ident()?);
                }
            }
        }

        let where_cond = if self.eat_kw("where") { self.parse_or_condition()? } else { IDX_NONE };
        let returning = self.parse_optional_returning()?;
        Ok(Query::Update(UpdateStmt { table, set, from_table, from_alias, where_cond, returning }))
    }

    fn parse_delete(&mut self) -> Result<Query> {
        self.expect_kw("from")?;
        let table = self.expect_qualified_ident()?;
        let where_cond = if self.eat_kw("where") { self.parse_or_condition()? } else { IDX_NONE };
        let returning = self.parse_optional_returning()?;
        Ok(Query::Delete(DeleteStmt { table, where_cond, returning }))
    }

    // ---------------------------------------------------------------
    // DDL
    // ---------------------------------------------------------------

    fn parse_create(&mut self) -> Result<Query> {
        if self.eat_kw("table") {
            return self.parse_create_table();
        }
        if self.eat_kw("unique") {
            self.expect_kw("index")?;
            return self.parse_create_index(true);
        }
        if self.eat_kw("index") {
            return self.parse_create_index(false);
        }
        if self.eat_kw("type") {
            let name = self.expect_ident()?;
            self.expect_kw("as")?;
            self.expect_kw("enum")?;
            self.expect_punct("(")?;
            let mut values = Vec::new();
            loop {
                match self.advance().kind {
                    TokKind::Str(s) => values.push(s),
                    other => return Err(MskqlError::Syntax(format!("expected string literal in ENUM value list, found {:?}", other))),
                }
                if !self.skip_punct(",") {
                    break;
                }
            }
            self.expect_punct(")")?;
            return Ok(Query::CreateType { name, values });
        }
        Err(MskqlError::Syntax("expected TABLE, INDEX, UNIQUE INDEX, or TYPE after CREATE".to_string()))
    }

    fn parse_create_table(&mut self) -> Result<Query> {
        let table = self.expect_qualified_ident()?;
        self.expect_punct("(")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_def()?);
            if !self.skip_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(Query::CreateTable(CreateTableStmt { table, columns }))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_ident()?;
        let (ty, enum_type_name, is_serial) = self.parse_data_type()?;
        let mut col = ColumnDef {
            name,
            ty,
            enum_type_name,
            not_null: false,
            unique: false,
            primary_key: false,
            default: IDX_NONE,
            is_serial,
            check_sql: None,
        };
        loop {
            if self.eat_kw("not") {
                self.expect_kw("null")?;
                col.not_null = true;
            } else if self.eat_kw("null") {
                // explicit NULL: no-op, already the default
            } else if self.eat_kw("default") {
                col.default = self.parse_expr()?;
            } else if self.eat_kw("unique") {
                col.unique = true;
            } else if self.eat_kw("primary") {
                self.expect_kw("key")?;
                col.primary_key = true;
                col.not_null = true;
            } else if self.eat_kw("check") {
                self.expect_punct("(")?;
                col.check_sql = Some(self.capture_balanced_parens()?);
            } else {
                break;
            }
        }
        Ok(col)
    }

    /// Returns `(type, enum_type_name, is_serial)` (§6 "Column types").
    fn parse_data_type(&mut self) -> Result<(CellType, Option<String>, bool)> {
        let name = self.expect_ident()?;
        let lower = name.to_ascii_lowercase();
        let result = match lower.as_str() {
            "int" | "integer" | "int4" => (CellType::Int, false),
            "serial" => (CellType::Int, true),
            "bigint" | "int8" => (CellType::BigInt, false),
            "bigserial" => (CellType::BigInt, true),
            "smallint" => (CellType::SmallInt, false),
            "float" | "float8" | "real" => (CellType::Float, false),
            "double" => {
                self.eat_kw("precision");
                (CellType::Float, false)
            }
            "numeric" | "decimal" => {
                self.skip_parenthesized_args();
                (CellType::Numeric, false)
            }
            "text" => (CellType::Text, false),
            "varchar" | "char" => {
                self.skip_parenthesized_args();
                (CellType::Text, false)
            }
            "boolean" | "bool" => (CellType::Boolean, false),
            "date" => (CellType::Date, false),
            "timestamp" => {
                let tz = self.eat_timezone_suffix();
                return Ok((if tz { CellType::TimestampTz } else { CellType::Timestamp }, None, false));
            }
            "timestamptz" => (CellType::TimestampTz, false),
            "time" => {
                self.eat_timezone_suffix();
                (CellType::Time, false)
            }
            "interval" => (CellType::Interval, false),
            "uuid" => (CellType::Uuid, false),
            _ => return Ok((CellType::Enum, Some(name), false)),
        };
        Ok((result.0, None, result.1))
    }

    fn eat_timezone_suffix(&mut self) -> bool {
        if self.eat_kw("with") {
            self.expect_kw("time").ok();
            self.expect_kw("zone").ok();
            true
        } else if self.eat_kw("without") {
            self.expect_kw("time").ok();
            self.expect_kw("zone").ok();
            false
        } else {
            false
        }
    }

    fn skip_parenthesized_args(&mut self) {
        if self.skip_punct("(") {
            loop {
                self.advance();
                if !self.skip_punct(",") {
                    break;
                }
            }
            self.skip_punct(")");
        }
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<Query> {
        let name = self.expect_ident()?;
        self.expect_kw("on")?;
        let table = self.expect_qualified_ident()?;
        self.expect_punct("(")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.expect_ident()?);
            if !self.skip_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(Query::CreateIndex { name, table, columns, unique })
    }

    fn parse_drop(&mut self) -> Result<Query> {
        if self.eat_kw("table") {
            self.eat_kw("if");
            self.eat_kw("exists");
            return Ok(Query::DropTable { name: self.expect_qualified_ident()? });
        }
        if self.eat_kw("index") {
            return Ok(Query::DropIndex { name: self.expect_ident()? });
        }
        if self.eat_kw("type") {
            return Ok(Query::DropType { name: self.expect_ident()? });
        }
        Err(MskqlError::Syntax("expected TABLE, INDEX, or TYPE after DROP".to_string()))
    }

    fn parse_alter(&mut self) -> Result<Query> {
        self.expect_kw("table")?;
        let table = self.expect_qualified_ident()?;
        let action = if self.eat_kw("add") {
            self.eat_kw("column");
            AlterAction::AddColumn(self.parse_column_def()?)
        } else if self.eat_kw("drop") {
            self.eat_kw("column");
            AlterAction::DropColumn(self.expect_ident()?)
        } else if self.eat_kw("rename") {
            self.eat_kw("column");
            let old = self.expect_ident()?;
            self.expect_kw("to")?;
            let new = self.expect_ident()?;
            AlterAction::RenameColumn { old, new }
        } else if self.eat_kw("alter") {
            self.eat_kw("column");
            let column = self.expect_ident()?;
            self.eat_kw("type");
            let (new_type, _enum_name, _serial) = self.parse_data_type()?;
            AlterAction::AlterType { column, new_type }
        } else {
            return Err(MskqlError::Syntax("expected ADD/DROP/RENAME/ALTER after ALTER TABLE".to_string()));
        };
        Ok(Query::AlterTable { table, action })
    }
}

fn attach_ctes(query: &mut Query, ctes: Vec<u32>) {
    match query {
        Query::Select(q) => q.ctes = ctes,
        Query::SetOp { lhs, .. } => attach_ctes(lhs, ctes),
        _ => {}
    }
}

fn builtin_func(name: &str) -> Option<Func> {
    match name.to_ascii_lowercase().as_str() {
        "coalesce" => Some(Func::Coalesce),
        "nullif" => Some(Func::NullIf),
        "greatest" => Some(Func::Greatest),
        "least" => Some(Func::Least),
        "upper" => Some(Func::Upper),
        "lower" => Some(Func::Lower),
        "length" => Some(Func::Length),
        "trim" => Some(Func::Trim),
        "substring" => Some(Func::Substring),
        _ => None,
    }
}

fn number_cell(text: &str) -> Cell {
    if text.contains('.') || text.contains('e') || text.contains('E') {
        Cell::float(text.parse::<f64>().unwrap_or(0.0))
    } else if let Ok(v) = text.parse::<i32>() {
        Cell::int(v)
    } else {
        Cell::bigint(text.parse::<i64>().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> (Arena<'static>, Query) {
        let mut arena = Arena::new();
        let q = parse_sql(&mut arena, sql).unwrap();
        (arena, q)
    }

    #[test]
    fn parses_simple_select_with_where_and_order() {
        let (_, q) = parse("SELECT name FROM t WHERE id > 1 ORDER BY id DESC");
        let Query::Select(s) = q else { panic!("expected select") };
        assert_eq!(s.from_table.as_deref(), Some("t"));
        assert_eq!(s.order_by.len(), 1);
    }

    #[test]
    fn parses_join_with_group_by() {
        let (_, q) = parse("SELECT u.id, SUM(o.amt) FROM u JOIN o ON u.id = o.uid GROUP BY u.id ORDER BY u.id");
        let Query::Select(s) = q else { panic!("expected select") };
        assert_eq!(s.joins.len(), 1);
        assert_eq!(s.group_by, vec!["u.id".to_string()]);
    }

    #[test]
    fn parses_recursive_cte_with_union_all() {
        let (_, q) = parse("WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT n+1 FROM r WHERE n < 5) SELECT n FROM r");
        let Query::Select(s) = q else { panic!("expected select") };
        assert_eq!(s.ctes.len(), 1);
        assert_eq!(s.from_table.as_deref(), Some("r"));
    }

    #[test]
    fn parses_insert_values() {
        let (_, q) = parse("INSERT INTO t VALUES (1, 'a'), (2, 'b')");
        let Query::Insert(stmt) = q else { panic!("expected insert") };
        let InsertSource::Values(rows) = stmt.source else { panic!("expected values") };
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn parses_window_function_over_order_by() {
        let (_, q) = parse("SELECT n, ROW_NUMBER() OVER (ORDER BY n DESC) FROM s");
        let Query::Select(s) = q else { panic!("expected select") };
        assert_eq!(s.columns.len(), 2);
    }

    #[test]
    fn parses_create_table_with_constraints() {
        let (_, q) = parse("CREATE TABLE t (id INT PRIMARY KEY, name TEXT NOT NULL, tag TEXT DEFAULT 'x')");
        let Query::CreateTable(stmt) = q else { panic!("expected create table") };
        assert_eq!(stmt.columns.len(), 3);
        assert!(stmt.columns[0].primary_key);
        assert!(stmt.columns[1].not_null);
    }

    #[test]
    fn parses_begin_commit_rollback() {
        assert!(matches!(parse("BEGIN").1, Query::Begin));
        assert!(matches!(parse("COMMIT").1, Query::Commit));
        assert!(matches!(parse("ROLLBACK").1, Query::Rollback));
    }

    #[test]
    fn parses_exists_subquery_condition() {
        let (arena, q) = parse("SELECT 1 FROM t WHERE EXISTS (SELECT 1 FROM u WHERE u.id = t.id)");
        let Query::Select(s) = q else { panic!("expected select") };
        match arena.conditions.get(s.where_cond) {
            Condition::Compare(cmp) => assert_eq!(cmp.op, CmpOp::Exists),
            _ => panic!("expected compare"),
        }
    }

    #[test]
    fn parses_in_list_and_between() {
        let (arena, q) = parse("SELECT * FROM t WHERE id IN (1, 2, 3) AND age BETWEEN 10 AND 20");
        let Query::Select(s) = q else { panic!("expected select") };
        match arena.conditions.get(s.where_cond) {
            Condition::And(a, _) => match arena.conditions.get(*a) {
                Condition::Compare(cmp) => assert_eq!(cmp.in_values.len(), 3),
                _ => panic!("expected compare"),
            },
            _ => panic!("expected and"),
        }
    }
}
