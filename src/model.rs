//! Entity types the repository can be bound to

use std::future::Future;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::{FromRow, PgPool, postgres::PgRow};

/// A relation recorded with [`Repository::preload`](crate::Repository::preload)
#[derive(Debug, Clone, PartialEq)]
pub struct Preload {
    pub relation: String,
    pub args: Vec<Value>,
}

impl Preload {
    pub fn new(relation: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            relation: relation.into(),
            args,
        }
    }
}

/// A row type stored in one table
///
/// Rows are read through [`FromRow`] and written as their serde JSON object,
/// so field names must match column names. `Default` supplies the value
/// `find_one_or_init` starts from.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Default, Serialize, Deserialize, sqlx::FromRow)]
/// struct Product {
///     id: i64,
///     title: String,
///     deleted_at: Option<chrono::DateTime<chrono::Utc>>,
/// }
///
/// impl Model for Product {
///     fn table_name() -> &'static str { "products" }
///     fn soft_delete_column() -> Option<&'static str> { Some("deleted_at") }
/// }
/// ```
pub trait Model:
    for<'r> FromRow<'r, PgRow> + Serialize + DeserializeOwned + Default + Send + Sync + Unpin + 'static
{
    fn table_name() -> &'static str;

    fn primary_key() -> &'static str {
        "id"
    }

    /// Columns selected and written. Empty means `*` and every serialized field.
    fn columns() -> &'static [&'static str] {
        &[]
    }

    /// Timestamp column marking a row as deleted, if the table soft-deletes
    fn soft_delete_column() -> Option<&'static str> {
        None
    }

    /// Load `preload.relation` into already fetched rows
    ///
    /// Models without relations keep the default, which rejects every name.
    fn preload(
        pool: &PgPool,
        rows: &mut [Self],
        preload: &Preload,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send {
        let _ = (pool, rows);
        let message = format!(
            "unknown relation `{}` for table `{}`",
            preload.relation,
            Self::table_name()
        );
        async move { Err(sqlx::Error::Configuration(message.into())) }
    }
}
