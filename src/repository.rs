//! Generic repository
//!
//! A [`Repository`] binds one [`Model`] type to one [`Context`]. Chainable
//! methods mutate its [`Query`] and return `&mut Self`; terminal methods run
//! the accumulated query and report failures through the context as
//! [`RepositoryError`](crate::RepositoryError).

use std::marker::PhantomData;

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{FromRow, postgres::PgRow};

use crate::context::Context;
use crate::error::{QueryError, Result};
use crate::model::{Model, Preload};
use crate::page::{self, PageOptions, Pagination};
use crate::sql::condition::{self, ConditionGroup};
use crate::sql::expr::Statement;
use crate::sql::query::{Clause, Cond, Query, is_blank};
use crate::sql::sanitize::{is_column_reference, quote_column};
use crate::store;

/// Serialize every value into a JSON object
fn to_objects<T: Serialize>(values: &[T]) -> std::result::Result<Vec<Map<String, Value>>, QueryError> {
    values
        .iter()
        .map(|value| match serde_json::to_value(value)? {
            Value::Object(map) => Ok(map),
            other => Err(QueryError::NotAnObject(other.to_string())),
        })
        .collect()
}

/// `base` with the fields of `patch` laid over it
fn merge<M: Model>(base: &M, patch: &Map<String, Value>) -> std::result::Result<M, QueryError> {
    let mut object = match serde_json::to_value(base)? {
        Value::Object(map) => map,
        other => return Err(QueryError::NotAnObject(other.to_string())),
    };
    object.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(serde_json::from_value(Value::Object(object))?)
}

/// Fields of one `updates` object that get written
///
/// Nulls are never written. An object that is a whole `M` (it deserializes
/// into `M` and serializes back unchanged) also skips every field still equal
/// to the one in `M::default()`, so a partly filled struct only writes what
/// was set. Other objects, such as partial maps, write every non-null key.
fn changed_fields<M: Model>(
    map: Map<String, Value>,
) -> std::result::Result<Map<String, Value>, QueryError> {
    let defaults = match serde_json::to_value(M::default())? {
        Value::Object(defaults) => defaults,
        other => return Err(QueryError::NotAnObject(other.to_string())),
    };
    let whole = serde_json::from_value::<M>(Value::Object(map.clone()))
        .ok()
        .and_then(|model| serde_json::to_value(model).ok())
        .is_some_and(|value| value.as_object() == Some(&map));

    Ok(map
        .into_iter()
        .filter(|(key, value)| !value.is_null() && !(whole && defaults.get(key) == Some(value)))
        .collect())
}

fn statement(sql: &str, values: Vec<Value>) -> Statement {
    let mut stmt = Statement::new(sql);
    stmt.args = values;
    stmt
}

/// Per-model, per-unit-of-work query and CRUD surface
///
/// # Example
///
/// ```rust,ignore
/// let mut repo = Repository::<Product>::new(&ctx);
/// let page = repo
///     .search_simple("singh", &["title_th", "title_en"])
///     .pagination(&PageOptions::new().with_page(2).with_order("id desc"))
///     .await?;
/// ```
pub struct Repository<M: Model> {
    ctx: Context,
    query: Query,
    _model: PhantomData<M>,
}

impl<M: Model> Repository<M> {
    pub fn new(ctx: &Context) -> Self {
        Self::with_query(ctx, Query::for_model::<M>())
    }

    /// Start from a prepared query instead of a clean one
    pub fn with_query(ctx: &Context, query: Query) -> Self {
        Self {
            ctx: ctx.clone(),
            query,
            _model: PhantomData,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The accumulated query
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Drop every accumulated option, keeping the model binding
    pub fn new_session(&mut self) -> &mut Self {
        self.query = self.query.reset();
        self
    }

    // =========================================================================
    // Chainable operations
    // =========================================================================

    /// Add a hand-written predicate with `?` placeholders
    pub fn filter(&mut self, sql: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.query.filter(sql, args);
        self
    }

    /// Add `column = value` (`column IS NULL` for null)
    pub fn filter_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.query.filter_eq(column, value.into());
        self
    }

    /// AND a compiled keyword group onto the filters
    pub fn search(&mut self, group: Option<&ConditionGroup>) -> &mut Self {
        condition::set_search(&mut self.query, group);
        self
    }

    /// AND `q` as a substring of any of `columns` onto the filters
    pub fn search_simple<K: AsRef<str>>(&mut self, q: &str, columns: &[K]) -> &mut Self {
        condition::set_search_simple(&mut self.query, q, columns);
        self
    }

    pub fn joins(&mut self, sql: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.query.join(sql, args);
        self
    }

    pub fn order(&mut self, order: impl Into<String>) -> &mut Self {
        self.query.order(order);
        self
    }

    pub fn group(&mut self, column: impl Into<String>) -> &mut Self {
        self.query.group(column);
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.query.limit(limit);
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.query.offset(offset);
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.query.distinct();
        self
    }

    pub fn select<C: AsRef<str>>(&mut self, columns: &[C]) -> &mut Self {
        self.query.select(columns);
        self
    }

    pub fn omit<C: AsRef<str>>(&mut self, columns: &[C]) -> &mut Self {
        self.query.omit(columns);
        self
    }

    /// Load `relation` through [`Model::preload`] after rows are fetched
    pub fn preload(&mut self, relation: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.query.preload(Preload::new(relation, args));
        self
    }

    /// Include soft-deleted rows
    pub fn unscoped(&mut self) -> &mut Self {
        self.query.unscoped();
        self
    }

    pub fn clauses(&mut self, clauses: impl IntoIterator<Item = Clause>) -> &mut Self {
        for clause in clauses {
            self.query.clause(clause);
        }
        self
    }

    /// Fields used only when `find_one_or_*` builds a new row
    ///
    /// Values that are not JSON objects are ignored.
    pub fn attrs(&mut self, values: Value) -> &mut Self {
        if let Value::Object(map) = values {
            self.query.attrs(map);
        }
        self
    }

    /// Fields `find_one_or_*` sets whether the row was found or built
    ///
    /// Values that are not JSON objects are ignored.
    pub fn assign(&mut self, values: Value) -> &mut Self {
        if let Value::Object(map) = values {
            self.query.assign(map);
        }
        self
    }

    // =========================================================================
    // Terminal operations
    // =========================================================================

    async fn load_preloads(&self, rows: &mut [M]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for preload in self.query.preloads() {
            M::preload(self.ctx.pool(), rows, preload)
                .await
                .map_err(|e| self.ctx.database_error(e))?;
        }
        Ok(())
    }

    /// All matching rows; none is an empty vector
    pub async fn find_all(&self, conds: &[Cond]) -> Result<Vec<M>> {
        let stmt = self.query.build_select(conds);
        let mut rows: Vec<M> = store::fetch_all(self.ctx.pool(), &stmt)
            .await
            .map_err(|e| self.ctx.database_error(e))?;
        self.load_preloads(&mut rows).await?;
        Ok(rows)
    }

    /// First matching row by primary key; none is `NotFound`
    pub async fn find_one(&self, conds: &[Cond]) -> Result<M> {
        let stmt = self.query.first().build_select(conds);
        let mut row: M = store::fetch_one(self.ctx.pool(), &stmt)
            .await
            .map_err(|e| self.ctx.lookup_error(e))?;
        self.load_preloads(std::slice::from_mut(&mut row)).await?;
        Ok(row)
    }

    pub async fn count(&self) -> Result<i64> {
        let stmt = self.query.build_count(&[]);
        store::count(self.ctx.pool(), &stmt)
            .await
            .map_err(|e| self.ctx.database_error(e))
    }

    async fn insert(&self, query: &Query, values: &[M]) -> Result<Vec<M>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let rows = to_objects(values).map_err(|e| self.ctx.database_error(e))?;

        // Rows without a primary key leave it to the column default, so they
        // cannot share a column list with rows that carry one.
        let primary_key = query.primary_key();
        let (keyed, fresh): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .enumerate()
            .partition(|(_, row)| row.get(primary_key).is_some_and(|v| !is_blank(v)));

        let mut stored: Vec<(usize, M)> = Vec::with_capacity(values.len());
        let mut complete = true;
        for group in [keyed, fresh] {
            if group.is_empty() {
                continue;
            }
            let (positions, group): (Vec<usize>, Vec<_>) = group.into_iter().unzip();
            let stmt = query
                .build_insert(&group)
                .map_err(|e| self.ctx.database_error(e))?;
            let rows: Vec<M> = store::fetch_all(self.ctx.pool(), &stmt)
                .await
                .map_err(|e| self.ctx.database_error(e))?;
            complete &= rows.len() == positions.len();
            stored.extend(positions.into_iter().zip(rows));
        }

        // Skipped conflicts leave no way to pair rows with their inputs.
        if complete {
            stored.sort_by_key(|(position, _)| *position);
        }
        Ok(stored.into_iter().map(|(_, row)| row).collect())
    }

    /// Insert rows and return them as stored, in input order
    ///
    /// An empty slice returns at once without touching the database. Rows
    /// that carry a primary key are written in one statement and rows that
    /// don't in a second. Under `ON CONFLICT DO NOTHING` skipped rows are
    /// missing from the result, and the rest come back keyed rows first.
    pub async fn create(&self, values: &[M]) -> Result<Vec<M>> {
        self.insert(&self.query, values).await
    }

    /// Insert rows, updating every written column when the primary key exists
    pub async fn save(&self, values: &[M]) -> Result<Vec<M>> {
        let mut query = self.query.clone();
        query.clause(Clause::OnConflictUpdateAll);
        self.insert(&query, values).await
    }

    /// Update the changed fields of a struct or map, returning rows affected
    ///
    /// A whole `M` writes its fields that differ from `M::default()`; any other
    /// object writes its non-null keys. A non-blank primary key in the value
    /// narrows the update to that row. An empty array is a no-op, and so is a
    /// value with nothing to write.
    pub async fn updates<T: Serialize>(&self, values: T) -> Result<u64> {
        let objects = match serde_json::to_value(&values).map_err(|e| self.ctx.database_error(e))? {
            Value::Array(items) => items,
            value => vec![value],
        };

        let mut affected = 0;
        for object in objects {
            let map = match object {
                Value::Object(map) => map,
                other => {
                    return Err(self
                        .ctx
                        .database_error(QueryError::NotAnObject(other.to_string())));
                }
            };

            let mut conds = Vec::new();
            if let Some(id) = map.get(self.query.primary_key()).filter(|v| !is_blank(v)) {
                conds.push(Cond::id(id.clone()));
            }
            let fields = changed_fields::<M>(map).map_err(|e| self.ctx.database_error(e))?;

            let stmt = match self.query.build_update(&fields, &conds) {
                Ok(stmt) => stmt,
                Err(QueryError::NoColumns) => continue,
                Err(e) => return Err(self.ctx.database_error(e)),
            };
            affected += store::execute(self.ctx.pool(), &stmt)
                .await
                .map_err(|e| self.ctx.database_error(e))?;
        }
        Ok(affected)
    }

    /// Set one column under the accumulated filter, returning rows affected
    pub async fn update_column(&self, column: &str, value: impl Into<Value>) -> Result<u64> {
        let mut fields = Map::new();
        fields.insert(column.to_string(), value.into());
        let stmt = self
            .query
            .build_update(&fields, &[])
            .map_err(|e| self.ctx.database_error(e))?;
        store::execute(self.ctx.pool(), &stmt)
            .await
            .map_err(|e| self.ctx.database_error(e))
    }

    async fn remove(&self, conds: &[Cond], soft: bool) -> Result<u64> {
        let stmt = self
            .query
            .build_delete(conds, soft)
            .map_err(|e| self.ctx.database_error(e))?;
        store::execute(self.ctx.pool(), &stmt)
            .await
            .map_err(|e| self.ctx.database_error(e))
    }

    /// Soft delete when the model has a soft-delete column, otherwise delete
    pub async fn delete(&self, conds: &[Cond]) -> Result<u64> {
        self.remove(conds, true).await
    }

    /// Delete rows permanently, soft-deleted ones included
    pub async fn hard_delete(&self, conds: &[Cond]) -> Result<u64> {
        self.remove(conds, false).await
    }

    /// One page of rows; `options` are normalized with the context config
    pub async fn pagination(&self, options: &PageOptions) -> Result<Pagination<M>> {
        let options = options.normalized(self.ctx.config());
        let (mut items, response) = page::paginate::<M>(self.ctx.pool(), &self.query, &options)
            .await
            .map_err(|e| self.ctx.database_error(e))?;
        self.load_preloads(&mut items).await?;
        Ok(Pagination::new(items, &response))
    }

    /// Default row seeded from equality conds, `attrs` and `assign`
    fn initial(&self, conds: &[Cond]) -> std::result::Result<M, QueryError> {
        let mut fields: Map<String, Value> = conds
            .iter()
            .filter_map(|c| c.pinned(self.query.primary_key()))
            .collect();
        fields.extend(self.query.attrs_map().clone());
        fields.extend(self.query.assign_map().clone());
        merge(&M::default(), &fields)
    }

    async fn find_optional(&self, conds: &[Cond]) -> Result<Option<M>> {
        let stmt = self.query.first().build_select(conds);
        store::fetch_optional(self.ctx.pool(), &stmt)
            .await
            .map_err(|e| self.ctx.database_error(e))
    }

    /// First matching row, or a new unsaved one when none matches
    ///
    /// Absence is not an error here. `assign` fields are applied to the result
    /// either way; nothing is written.
    pub async fn find_one_or_init(&self, conds: &[Cond]) -> Result<M> {
        let result = match self.find_optional(conds).await? {
            Some(found) => merge(&found, self.query.assign_map()),
            None => self.initial(conds),
        };
        result.map_err(|e| self.ctx.database_error(e))
    }

    /// First matching row, or a newly inserted one when none matches
    ///
    /// A found row gets `assign` fields written back to it.
    pub async fn find_one_or_create(&self, conds: &[Cond]) -> Result<M> {
        if let Some(found) = self.find_optional(conds).await? {
            let assign = self.query.assign_map();
            if assign.is_empty() {
                return Ok(found);
            }

            let updated = merge(&found, assign).map_err(|e| self.ctx.database_error(e))?;
            let id = serde_json::to_value(&found)
                .map_err(|e| self.ctx.database_error(e))?
                .get(self.query.primary_key())
                .cloned()
                .unwrap_or(Value::Null);
            let mut scope = self.query.reset();
            scope.unscoped();
            let stmt = scope
                .build_update(assign, &[Cond::id(id)])
                .map_err(|e| self.ctx.database_error(e))?;
            store::execute(self.ctx.pool(), &stmt)
                .await
                .map_err(|e| self.ctx.database_error(e))?;
            return Ok(updated);
        }

        let row = self.initial(conds).map_err(|e| self.ctx.database_error(e))?;
        let mut stored = self.insert(&self.query, std::slice::from_ref(&row)).await?;
        Ok(stored.pop().unwrap_or(row))
    }

    /// Caller-written query with `?` placeholders, one row; none is `NotFound`
    pub async fn raw<O>(&self, sql: &str, values: Vec<Value>) -> Result<O>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        store::fetch_one(self.ctx.pool(), &statement(sql, values))
            .await
            .map_err(|e| self.ctx.lookup_error(e))
    }

    /// Caller-written query with `?` placeholders, every row
    pub async fn raw_all<O>(&self, sql: &str, values: Vec<Value>) -> Result<Vec<O>>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        store::fetch_all(self.ctx.pool(), &statement(sql, values))
            .await
            .map_err(|e| self.ctx.database_error(e))
    }

    /// Caller-written statement with `?` placeholders, returning rows affected
    pub async fn exec(&self, sql: &str, values: Vec<Value>) -> Result<u64> {
        store::execute(self.ctx.pool(), &statement(sql, values))
            .await
            .map_err(|e| self.ctx.database_error(e))
    }

    /// One column of every matching row
    pub async fn pluck<T>(&self, column: &str) -> Result<Vec<T>>
    where
        T: Send + Unpin,
        (T,): for<'r> FromRow<'r, PgRow>,
    {
        let column = if is_column_reference(column) {
            quote_column(column)
        } else {
            column.to_string()
        };
        let stmt = self.query.build_select_columns(&column, &[]);
        store::fetch_column(self.ctx.pool(), &stmt)
            .await
            .map_err(|e| self.ctx.database_error(e))
    }

    /// Matching rows read into any row type, e.g. after `select` or `group`
    pub async fn scan<O>(&self) -> Result<Vec<O>>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        store::fetch_all(self.ctx.pool(), &self.query.build_select(&[]))
            .await
            .map_err(|e| self.ctx.database_error(e))
    }

    /// Walk matching rows in primary-key order, `batch_size` at a time
    ///
    /// `callback` gets each batch and its 1-based number; an error from it
    /// stops the walk and is returned. Returns the number of rows visited.
    pub async fn find_in_batches<F>(&self, batch_size: i64, mut callback: F) -> Result<u64>
    where
        F: FnMut(Vec<M>, usize) -> Result<()>,
    {
        let size = batch_size.max(1);
        let mut after: Option<Value> = None;
        let mut batch = 0usize;
        let mut visited = 0u64;

        loop {
            let stmt = self.query.batch(size, after.as_ref()).build_select(&[]);
            let mut rows: Vec<M> = store::fetch_all(self.ctx.pool(), &stmt)
                .await
                .map_err(|e| self.ctx.database_error(e))?;
            if rows.is_empty() {
                break;
            }
            self.load_preloads(&mut rows).await?;

            let fetched = rows.len();
            after = match rows.last() {
                Some(last) => serde_json::to_value(last)
                    .map_err(|e| self.ctx.database_error(e))?
                    .get(self.query.primary_key())
                    .cloned(),
                None => None,
            };

            batch += 1;
            visited += fetched as u64;
            callback(rows, batch)?;

            if (fetched as i64) < size || after.is_none() {
                break;
            }
        }

        Ok(visited)
    }
}
