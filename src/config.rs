//! Configuration for the repository layer
//!
//! Provides a builder pattern for configuring the store, plus loading from
//! `APP_*` environment variables (and a `.env` file when present).

use crate::error::ConfigError;

/// Default number of rows per page when the request gives none
pub const PAGE_LIMIT_DEFAULT: i64 = 30;
/// Upper bound for a requested page size
pub const PAGE_LIMIT_MAX: i64 = 100;
/// Default connection pool size
pub const MAX_CONNECTIONS_DEFAULT: u32 = 10;

/// Configuration for the store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Page size used when a request asks for none (or for `<= 0`)
    pub page_limit_default: i64,
    /// Largest page size a request may ask for
    pub page_limit_max: i64,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }

    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first; variables
    /// already set in the environment win.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Recognized keys:
    /// - `APP_DB_DSN`, or `APP_DB_HOST`, `APP_DB_PORT`, `APP_DB_USER`,
    ///   `APP_DB_PASSWORD`, `APP_DB_NAME` when no DSN is given
    /// - `APP_DB_MAX_CONNECTIONS`
    /// - `APP_PAGE_LIMIT_DEFAULT`, `APP_PAGE_LIMIT_MAX`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = match get("APP_DB_DSN") {
            Some(dsn) => dsn,
            None => {
                let host = get("APP_DB_HOST")
                    .ok_or_else(|| ConfigError::Missing("APP_DB_DSN or APP_DB_HOST".into()))?;
                let name = get("APP_DB_NAME")
                    .ok_or_else(|| ConfigError::Missing("APP_DB_NAME".into()))?;
                let port = get("APP_DB_PORT").unwrap_or_else(|| "5432".to_string());
                let credentials = match (get("APP_DB_USER"), get("APP_DB_PASSWORD")) {
                    (Some(user), Some(password)) => format!("{}:{}@", user, password),
                    (Some(user), None) => format!("{}@", user),
                    _ => String::new(),
                };
                format!("postgres://{}{}:{}/{}", credentials, host, port, name)
            }
        };

        let mut builder = StoreConfigBuilder::new(database_url);

        if let Some(value) = get("APP_DB_MAX_CONNECTIONS") {
            builder = builder.max_connections(parse_key("APP_DB_MAX_CONNECTIONS", &value)?);
        }
        if let Some(value) = get("APP_PAGE_LIMIT_DEFAULT") {
            builder = builder.page_limit_default(parse_key("APP_PAGE_LIMIT_DEFAULT", &value)?);
        }
        if let Some(value) = get("APP_PAGE_LIMIT_MAX") {
            builder = builder.page_limit_max(parse_key("APP_PAGE_LIMIT_MAX", &value)?);
        }

        Ok(builder.build())
    }
}

fn parse_key<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    max_connections: u32,
    page_limit_default: i64,
    page_limit_max: i64,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: MAX_CONNECTIONS_DEFAULT,
            page_limit_default: PAGE_LIMIT_DEFAULT,
            page_limit_max: PAGE_LIMIT_MAX,
        }
    }

    /// Set the pool size (default: 10)
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the default page size (default: 30)
    pub fn page_limit_default(mut self, limit: i64) -> Self {
        self.page_limit_default = limit;
        self
    }

    /// Set the largest allowed page size (default: 100)
    pub fn page_limit_max(mut self, limit: i64) -> Self {
        self.page_limit_max = limit;
        self
    }

    /// Build the configuration
    ///
    /// Limits are forced to at least 1, and the default never exceeds the max.
    pub fn build(self) -> StoreConfig {
        let page_limit_max = self.page_limit_max.max(1);
        StoreConfig {
            database_url: self.database_url,
            max_connections: self.max_connections.max(1),
            page_limit_default: self.page_limit_default.clamp(1, page_limit_max),
            page_limit_max,
        }
    }
}
