//! Unit-of-work context
//!
//! A [`Context`] is what a request handler or job step holds while it talks to
//! the database: the shared pool, the configuration and an id that ties log
//! lines of one unit of work together.

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::StoreConfig;
use crate::error::{BoxError, ErrorKind, RepositoryError, Result};

#[derive(Debug, Clone)]
pub struct Context {
    pool: PgPool,
    config: Arc<StoreConfig>,
    request_id: String,
}

impl Context {
    /// Connect a new pool sized by `config.max_connections`
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(RepositoryError::database)?;

        Ok(Self::from_pool(pool, config))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, config: StoreConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Use a caller-provided request id, e.g. one taken from an incoming header
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// A context for another unit of work over the same pool and config
    pub fn session(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: Arc::clone(&self.config),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wrap `err` as a [`RepositoryError`] of `kind` and report it
    ///
    /// Database errors are logged at error level, not-found at debug.
    pub fn new_error(&self, err: impl Into<BoxError>, kind: ErrorKind) -> RepositoryError {
        let err = RepositoryError::new(kind, err);
        match kind {
            ErrorKind::DatabaseError => tracing::error!(
                request_id = %self.request_id,
                code = err.code(),
                error = %err.cause(),
                "repository operation failed"
            ),
            ErrorKind::NotFound => tracing::debug!(
                request_id = %self.request_id,
                code = err.code(),
                error = %err.cause(),
                "record not found"
            ),
        }
        err
    }

    /// Report a driver error from a statement that is not a single-row lookup
    pub(crate) fn database_error(&self, err: impl Into<BoxError>) -> RepositoryError {
        self.new_error(err, ErrorKind::DatabaseError)
    }

    /// Report a driver error from a single-row lookup
    pub(crate) fn lookup_error(&self, err: sqlx::Error) -> RepositoryError {
        let kind = crate::error::lookup_kind(&err);
        self.new_error(err, kind)
    }
}
