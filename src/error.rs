//! Error types for repository operations

use thiserror::Error;

/// Boxed underlying cause attached to every [`RepositoryError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome taxonomy of terminal repository operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A single-row lookup found nothing
    NotFound,
    /// Any other store-level failure
    DatabaseError,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::DatabaseError => "DATABASE_ERROR",
        }
    }

    /// HTTP status an outer layer would usually map this kind to
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::DatabaseError => 500,
        }
    }
}

/// Errors returned by terminal repository operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {source}")]
    NotFound {
        #[source]
        source: BoxError,
    },

    #[error("Database error: {source}")]
    Database {
        #[source]
        source: BoxError,
    },
}

impl RepositoryError {
    pub fn not_found(err: impl Into<BoxError>) -> Self {
        Self::NotFound { source: err.into() }
    }

    pub fn database(err: impl Into<BoxError>) -> Self {
        Self::Database { source: err.into() }
    }

    /// Build an error of the given kind around `err`
    pub fn new(kind: ErrorKind, err: impl Into<BoxError>) -> Self {
        match kind {
            ErrorKind::NotFound => Self::not_found(err),
            ErrorKind::DatabaseError => Self::database(err),
        }
    }

    /// Classify a driver error raised by a single-row lookup
    ///
    /// `RowNotFound` becomes [`ErrorKind::NotFound`], everything else is a
    /// [`ErrorKind::DatabaseError`].
    pub fn from_lookup(err: sqlx::Error) -> Self {
        Self::new(lookup_kind(&err), err)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Database { .. } => ErrorKind::DatabaseError,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub fn status(&self) -> u16 {
        self.kind().status()
    }

    /// The underlying cause
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        match self {
            Self::NotFound { source } | Self::Database { source } => source.as_ref(),
        }
    }
}

/// Kind a driver error maps to when it comes out of a single-row lookup
pub fn lookup_kind(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        _ => ErrorKind::DatabaseError,
    }
}

/// Statements the crate refuses to build before anything reaches the store
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("WHERE conditions required for {0}")]
    MissingWhereClause(&'static str),

    #[error("Expected a JSON object or array of objects, got {0}")]
    NotAnObject(String),

    #[error("Nothing to write: no columns left after select/omit")]
    NoColumns,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
