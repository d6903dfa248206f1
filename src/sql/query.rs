//! Query accumulator
//!
//! [`Query`] collects filters, joins, ordering and write options for one
//! table and renders them into SELECT, COUNT, INSERT, UPDATE and DELETE
//! statements. Rendering is pure; execution lives in [`crate::store`].

use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::model::{Model, Preload};
use crate::sql::expr::{Expr, Statement};
use crate::sql::sanitize::{is_column_reference, quote_column, quote_identifier, quote_qualified};

/// Ad-hoc condition passed to a terminal operation
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// `primary_key = value`, or `primary_key IN (...)` for an array
    PrimaryKey(Value),
    /// `column = value`, or `column IS NULL` for null
    Eq(String, Value),
    /// Hand-written SQL with `?` placeholders
    Raw(String, Vec<Value>),
}

impl Cond {
    pub fn id(value: impl Into<Value>) -> Self {
        Cond::PrimaryKey(value.into())
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Cond::Eq(column.into(), value.into())
    }

    pub fn raw(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Cond::Raw(sql.into(), args)
    }

    fn to_expr(&self, table: &str, primary_key: &str) -> Expr {
        match self {
            Cond::PrimaryKey(Value::Array(values)) => {
                let column = quote_qualified(table, primary_key);
                if values.is_empty() {
                    return Expr::raw("1 = 0", vec![]);
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                Expr::raw(format!("{} IN ({})", column, placeholders), values.clone())
            }
            Cond::PrimaryKey(value) => equality(&quote_qualified(table, primary_key), value),
            Cond::Eq(column, value) => equality(&quote_column(column), value),
            Cond::Raw(sql, args) => Expr::raw(sql.clone(), args.clone()),
        }
    }

    /// The `(column, value)` pair this condition pins, if it is a plain equality
    pub(crate) fn pinned(&self, primary_key: &str) -> Option<(String, Value)> {
        match self {
            Cond::PrimaryKey(value) if !value.is_array() && !value.is_null() => {
                Some((primary_key.to_string(), value.clone()))
            }
            Cond::Eq(column, value) if !value.is_null() => {
                let column = column.rsplit('.').next().unwrap_or(column);
                Some((column.to_string(), value.clone()))
            }
            _ => None,
        }
    }
}

fn equality(column: &str, value: &Value) -> Expr {
    match value {
        Value::Null => Expr::raw(format!("{} IS NULL", column), vec![]),
        other => Expr::raw(format!("{} = ?", column), vec![other.clone()]),
    }
}

/// Statement modifiers
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `ON CONFLICT DO NOTHING`
    OnConflictDoNothing,
    /// `ON CONFLICT (pk) DO UPDATE` of every written column
    OnConflictUpdateAll,
    /// `ON CONFLICT (pk) DO UPDATE` of the listed columns
    OnConflictUpdate(Vec<String>),
    /// `FOR UPDATE` row lock on SELECT
    ForUpdate,
    /// `FOR SHARE` row lock on SELECT
    ForShare,
}

/// Primary key values that mean "not assigned yet"
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Mutable query state for one table
#[derive(Debug, Clone)]
pub struct Query {
    table: String,
    primary_key: String,
    columns: Vec<String>,
    soft_delete: Option<String>,
    wheres: Vec<Expr>,
    joins: Vec<Statement>,
    order: Vec<String>,
    group: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    distinct: bool,
    select: Vec<String>,
    omit: Vec<String>,
    preloads: Vec<Preload>,
    unscoped: bool,
    clauses: Vec<Clause>,
    attrs: Map<String, Value>,
    assign: Map<String, Value>,
}

impl Query {
    /// A clean query over `table`, primary key `id`, selecting `*`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            columns: Vec::new(),
            soft_delete: None,
            wheres: Vec::new(),
            joins: Vec::new(),
            order: Vec::new(),
            group: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            select: Vec::new(),
            omit: Vec::new(),
            preloads: Vec::new(),
            unscoped: false,
            clauses: Vec::new(),
            attrs: Map::new(),
            assign: Map::new(),
        }
    }

    /// A clean query carrying the table identity of `M`
    pub fn for_model<M: Model>() -> Self {
        let mut query = Self::new(M::table_name());
        query.primary_key = M::primary_key().to_string();
        query.columns = M::columns().iter().map(|c| c.to_string()).collect();
        query.soft_delete = M::soft_delete_column().map(str::to_string);
        query
    }

    /// The same table identity with every accumulated option dropped
    pub fn reset(&self) -> Self {
        let mut query = Self::new(self.table.clone());
        query.primary_key = self.primary_key.clone();
        query.columns = self.columns.clone();
        query.soft_delete = self.soft_delete.clone();
        query
    }

    /// Point the query at another table with the same shape
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = Some(column.into());
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    // ---- accumulation ----

    pub fn push_filter(&mut self, expr: Expr) -> &mut Self {
        if !expr.is_empty() {
            self.wheres.push(expr);
        }
        self
    }

    pub fn filter(&mut self, sql: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.push_filter(Expr::raw(sql, args))
    }

    /// `column = value`, or `column IS NULL` for null
    pub fn filter_eq(&mut self, column: &str, value: Value) -> &mut Self {
        self.push_filter(equality(&quote_column(column), &value))
    }

    pub fn join(&mut self, sql: impl Into<String>, args: Vec<Value>) -> &mut Self {
        let mut stmt = Statement::new(sql);
        stmt.args = args;
        self.joins.push(stmt);
        self
    }

    pub fn order(&mut self, order: impl Into<String>) -> &mut Self {
        let order = order.into();
        if !order.trim().is_empty() {
            self.order.push(order);
        }
        self
    }

    pub fn group(&mut self, column: impl Into<String>) -> &mut Self {
        self.group.push(column.into());
        self
    }

    /// Negative values clear the limit
    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = (limit >= 0).then_some(limit);
        self
    }

    /// Negative values clear the offset
    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.offset = (offset >= 0).then_some(offset);
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    pub fn select<C: AsRef<str>>(&mut self, columns: &[C]) -> &mut Self {
        self.select = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn omit<C: AsRef<str>>(&mut self, columns: &[C]) -> &mut Self {
        self.omit
            .extend(columns.iter().map(|c| c.as_ref().to_string()));
        self
    }

    pub fn preload(&mut self, preload: Preload) -> &mut Self {
        self.preloads.push(preload);
        self
    }

    pub fn unscoped(&mut self) -> &mut Self {
        self.unscoped = true;
        self
    }

    pub fn clause(&mut self, clause: Clause) -> &mut Self {
        self.clauses.push(clause);
        self
    }

    pub fn attrs(&mut self, values: Map<String, Value>) -> &mut Self {
        self.attrs.extend(values);
        self
    }

    pub fn assign(&mut self, values: Map<String, Value>) -> &mut Self {
        self.assign.extend(values);
        self
    }

    // ---- accessors ----

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn soft_delete_column(&self) -> Option<&str> {
        self.soft_delete.as_deref()
    }

    pub fn is_unscoped(&self) -> bool {
        self.unscoped
    }

    pub fn preloads(&self) -> &[Preload] {
        &self.preloads
    }

    pub fn attrs_map(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn assign_map(&self) -> &Map<String, Value> {
        &self.assign
    }

    /// Copy ordered by primary key after any explicit order, limited to one row
    pub fn first(&self) -> Self {
        let mut query = self.clone();
        query.order.push(quote_qualified(&self.table, &self.primary_key));
        query.limit = Some(1);
        query
    }

    /// Copy serving one keyset batch: ordered by primary key only, rows after `after`
    pub fn batch(&self, size: i64, after: Option<&Value>) -> Self {
        let column = quote_qualified(&self.table, &self.primary_key);
        let mut query = self.clone();
        query.order = vec![column.clone()];
        query.limit = Some(size);
        query.offset = None;
        if let Some(last) = after {
            query.push_filter(Expr::raw(format!("{} > ?", column), vec![last.clone()]));
        }
        query
    }

    // ---- rendering ----

    /// Caller filters plus `conds`, without the soft-delete scope
    fn filters(&self, conds: &[Cond]) -> Vec<Expr> {
        let mut exprs = self.wheres.clone();
        exprs.extend(conds.iter().map(|c| c.to_expr(&self.table, &self.primary_key)));
        exprs.retain(|e| !e.is_empty());
        exprs
    }

    fn scope(&self) -> Option<Expr> {
        match (&self.soft_delete, self.unscoped) {
            (Some(column), false) => Some(Expr::raw(
                format!("{} IS NULL", quote_qualified(&self.table, column)),
                vec![],
            )),
            _ => None,
        }
    }

    fn render_where(exprs: &[Expr]) -> Option<Statement> {
        if exprs.is_empty() {
            return None;
        }
        let mut stmt = Statement::default();
        stmt.push_conditions(exprs);
        Some(stmt)
    }

    /// The WHERE body (without the keyword) for reads, soft-delete scope included
    pub fn where_statement(&self) -> Option<Statement> {
        self.where_with(&[])
    }

    fn where_with(&self, conds: &[Cond]) -> Option<Statement> {
        let mut exprs = self.filters(conds);
        exprs.extend(self.scope());
        Self::render_where(&exprs)
    }

    fn push_where(stmt: &mut Statement, body: Option<Statement>) {
        if let Some(body) = body {
            stmt.push(" WHERE ");
            stmt.append(body);
        }
    }

    fn select_list(&self) -> String {
        if !self.select.is_empty() {
            return self
                .select
                .iter()
                .map(|c| {
                    if is_column_reference(c) {
                        quote_column(c)
                    } else {
                        c.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
        }

        let columns: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !self.omit.contains(c))
            .map(|c| quote_qualified(&self.table, c))
            .collect();

        if columns.is_empty() {
            format!("{}.*", quote_identifier(&self.table))
        } else {
            columns.join(", ")
        }
    }

    /// `SELECT ... FROM ... [JOIN] [WHERE] [GROUP BY]` shared by select and count
    fn base_select(&self, columns: &str, conds: &[Cond]) -> Statement {
        let mut stmt = Statement::new("SELECT ");
        if self.distinct {
            stmt.push("DISTINCT ");
        }
        stmt.push(columns);
        stmt.push(" FROM ");
        stmt.push(&quote_identifier(&self.table));
        for join in &self.joins {
            stmt.push(" ");
            stmt.append(join.clone());
        }
        Self::push_where(&mut stmt, self.where_with(conds));
        if !self.group.is_empty() {
            stmt.push(" GROUP BY ");
            stmt.push(&self.group.join(", "));
        }
        stmt
    }

    /// Full SELECT with ordering, window and lock
    pub fn build_select(&self, conds: &[Cond]) -> Statement {
        self.build_select_columns(&self.select_list(), conds)
    }

    /// SELECT of an explicit column list, e.g. for `pluck`
    pub fn build_select_columns(&self, columns: &str, conds: &[Cond]) -> Statement {
        let mut stmt = self.base_select(columns, conds);
        if !self.order.is_empty() {
            stmt.push(" ORDER BY ");
            stmt.push(&self.order.join(", "));
        }
        if let Some(limit) = self.limit {
            stmt.push(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            stmt.push(&format!(" OFFSET {}", offset));
        }
        for clause in &self.clauses {
            match clause {
                Clause::ForUpdate => stmt.push(" FOR UPDATE"),
                Clause::ForShare => stmt.push(" FOR SHARE"),
                _ => {}
            }
        }
        stmt
    }

    /// `SELECT COUNT(*)` over the same filter, ignoring order and window
    pub fn build_count(&self, conds: &[Cond]) -> Statement {
        if self.group.is_empty() && !self.distinct {
            return self.base_select("COUNT(*)", conds);
        }
        let mut stmt = Statement::new("SELECT COUNT(*) FROM (");
        stmt.append(self.base_select(&self.select_list(), conds));
        stmt.push(") AS \"counted\"");
        stmt
    }

    fn writable(&self, column: &str) -> bool {
        if !self.select.is_empty() && !self.select.iter().any(|c| c == column) {
            return false;
        }
        if self.omit.iter().any(|c| c == column) {
            return false;
        }
        self.columns.is_empty() || self.columns.iter().any(|c| c == column)
    }

    /// INSERT of JSON objects through `jsonb_populate_recordset`
    ///
    /// A blank primary key (null, 0 or "") is left to the column default.
    pub fn build_insert(&self, rows: &[Map<String, Value>]) -> Result<Statement, QueryError> {
        let mut columns: Vec<String> = Vec::new();
        let mut payload = Vec::with_capacity(rows.len());

        for row in rows {
            let mut cleaned = Map::new();
            for (key, value) in row {
                if key == &self.primary_key && is_blank(value) {
                    continue;
                }
                if !self.writable(key) {
                    continue;
                }
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
                cleaned.insert(key.clone(), value.clone());
            }
            payload.push(Value::Object(cleaned));
        }

        if columns.is_empty() {
            return Err(QueryError::NoColumns);
        }

        let list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let table = quote_identifier(&self.table);

        let mut stmt = Statement::new(format!("INSERT INTO {} ({}) SELECT {} FROM ", table, list, list));
        stmt.push_arg(
            &format!("jsonb_populate_recordset(NULL::{}, ?::jsonb)", table),
            Value::Array(payload),
        );
        self.push_conflict(&mut stmt, &columns);
        stmt.push(" RETURNING *");
        Ok(stmt)
    }

    fn push_conflict(&self, stmt: &mut Statement, written: &[String]) {
        let update: Option<Vec<&String>> = self.clauses.iter().find_map(|clause| match clause {
            Clause::OnConflictDoNothing => Some(Vec::new()),
            Clause::OnConflictUpdateAll => {
                Some(written.iter().filter(|c| **c != self.primary_key).collect())
            }
            Clause::OnConflictUpdate(columns) => Some(columns.iter().collect()),
            _ => None,
        });

        let Some(update) = update else {
            return;
        };

        if update.is_empty() {
            stmt.push(" ON CONFLICT DO NOTHING");
            return;
        }

        let set = update
            .iter()
            .map(|c| {
                let column = quote_identifier(c);
                format!("{} = EXCLUDED.{}", column, column)
            })
            .collect::<Vec<_>>()
            .join(", ");
        stmt.push(&format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            quote_identifier(&self.primary_key),
            set
        ));
    }

    /// UPDATE of the given columns under the accumulated filter plus `conds`
    ///
    /// Values go through `jsonb_populate_record` so each lands in its column's
    /// type. An update with no filter at all is refused.
    pub fn build_update(
        &self,
        values: &Map<String, Value>,
        conds: &[Cond],
    ) -> Result<Statement, QueryError> {
        let filters = self.filters(conds);
        if filters.is_empty() {
            return Err(QueryError::MissingWhereClause("update"));
        }

        let columns: Vec<&String> = values
            .keys()
            .filter(|k| **k != self.primary_key && self.writable(k))
            .collect();
        if columns.is_empty() {
            return Err(QueryError::NoColumns);
        }

        let payload: Map<String, Value> = columns
            .iter()
            .map(|c| ((*c).clone(), values[c.as_str()].clone()))
            .collect();
        let list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let table = quote_identifier(&self.table);
        let source = format!("(SELECT {} FROM jsonb_populate_record(NULL::{}, ?::jsonb))", list, table);

        let target = if columns.len() == 1 {
            list
        } else {
            format!("({})", list)
        };

        let mut stmt = Statement::new(format!("UPDATE {} SET {} = ", table, target));
        stmt.push_arg(&source, Value::Object(payload));

        let mut exprs = filters;
        exprs.extend(self.scope());
        Self::push_where(&mut stmt, Self::render_where(&exprs));
        Ok(stmt)
    }

    /// DELETE, or `SET deleted_at = NOW()` when `soft` and the table soft-deletes
    ///
    /// A delete with no filter at all is refused.
    pub fn build_delete(&self, conds: &[Cond], soft: bool) -> Result<Statement, QueryError> {
        let filters = self.filters(conds);
        if filters.is_empty() {
            return Err(QueryError::MissingWhereClause("delete"));
        }

        let table = quote_identifier(&self.table);
        match (&self.soft_delete, soft) {
            (Some(column), true) => {
                let mut stmt = Statement::new(format!(
                    "UPDATE {} SET {} = NOW()",
                    table,
                    quote_identifier(column)
                ));
                let mut exprs = filters;
                exprs.extend(self.scope());
                Self::push_where(&mut stmt, Self::render_where(&exprs));
                Ok(stmt)
            }
            _ => {
                let mut stmt = Statement::new(format!("DELETE FROM {}", table));
                Self::push_where(&mut stmt, Self::render_where(&filters));
                Ok(stmt)
            }
        }
    }
}
