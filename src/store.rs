//! Statement execution against a PostgreSQL pool
//!
//! Rendered [`Statement`]s carry their arguments as JSON values; this module
//! turns them into typed bind parameters and runs the statement.

use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, FromRow, PgPool};

use crate::sql::expr::Statement;

/// Bind JSON arguments in placeholder order
///
/// Scalars bind as their natural Postgres type (`text`, `int8`, `float8`,
/// `bool`); arrays and objects bind as `jsonb`. Null binds as a null `text`.
pub fn bind_args(args: &[Value]) -> Result<PgArguments, sqlx::Error> {
    let mut arguments = PgArguments::default();
    for value in args {
        bind_value(&mut arguments, value)?;
    }
    Ok(arguments)
}

fn bind_value(arguments: &mut PgArguments, value: &Value) -> Result<(), sqlx::Error> {
    let result = match value {
        Value::Null => arguments.add(None::<String>),
        Value::Bool(b) => arguments.add(*b),
        Value::Number(n) => match n.as_i64() {
            Some(int_val) => arguments.add(int_val),
            None => arguments.add(n.as_f64()),
        },
        Value::String(s) => arguments.add(s.clone()),
        other => arguments.add(sqlx::types::Json(other.clone())),
    };
    result.map_err(sqlx::Error::Encode)
}

/// Fetch every row as `O`
pub async fn fetch_all<O>(pool: &PgPool, stmt: &Statement) -> Result<Vec<O>, sqlx::Error>
where
    O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let sql = stmt.to_postgres();
    sqlx::query_as_with::<_, O, _>(&sql, bind_args(&stmt.args)?)
        .fetch_all(pool)
        .await
}

/// Fetch exactly one row; no rows is `sqlx::Error::RowNotFound`
pub async fn fetch_one<O>(pool: &PgPool, stmt: &Statement) -> Result<O, sqlx::Error>
where
    O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let sql = stmt.to_postgres();
    sqlx::query_as_with::<_, O, _>(&sql, bind_args(&stmt.args)?)
        .fetch_one(pool)
        .await
}

/// Fetch at most one row
pub async fn fetch_optional<O>(pool: &PgPool, stmt: &Statement) -> Result<Option<O>, sqlx::Error>
where
    O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let sql = stmt.to_postgres();
    sqlx::query_as_with::<_, O, _>(&sql, bind_args(&stmt.args)?)
        .fetch_optional(pool)
        .await
}

/// Fetch the first column of every row
pub async fn fetch_column<T>(pool: &PgPool, stmt: &Statement) -> Result<Vec<T>, sqlx::Error>
where
    T: Send + Unpin,
    (T,): for<'r> FromRow<'r, PgRow>,
{
    let sql = stmt.to_postgres();
    sqlx::query_scalar_with::<_, T, _>(&sql, bind_args(&stmt.args)?)
        .fetch_all(pool)
        .await
}

/// Run a `SELECT COUNT(*)` statement
pub async fn count(pool: &PgPool, stmt: &Statement) -> Result<i64, sqlx::Error> {
    let sql = stmt.to_postgres();
    sqlx::query_scalar_with::<_, i64, _>(&sql, bind_args(&stmt.args)?)
        .fetch_one(pool)
        .await
}

/// Run a statement for its side effect, returning the rows affected
pub async fn execute(pool: &PgPool, stmt: &Statement) -> Result<u64, sqlx::Error> {
    let sql = stmt.to_postgres();
    let result = sqlx::query_with(&sql, bind_args(&stmt.args)?)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
