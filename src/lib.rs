//! # search-repository
//!
//! Keyword search compiler and generic paginated repository over PostgreSQL.
//!
//! ## Features
//!
//! - **Keyword Conditions**: declarative AND/OR groups of exact-match and
//!   substring predicates, compiled into WHERE fragments that compose with
//!   hand-written filters
//! - **Generic Repository**: one chainable query/CRUD surface for any type
//!   implementing [`Model`]
//! - **Pagination**: page/limit normalization with an accurate total from a
//!   separate count query
//! - **Soft Delete**: optional `deleted_at` scoping per model
//! - **Two Error Kinds**: every terminal operation reports either
//!   [`ErrorKind::NotFound`] or [`ErrorKind::DatabaseError`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use search_repository::{
//!     ConditionGroup, Context, KeywordOption, Model, PageOptions, Repository, StoreConfig,
//!     wildcard_options,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize, sqlx::FromRow)]
//! struct Product {
//!     id: i64,
//!     title_th: String,
//!     title_en: String,
//!     status: String,
//! }
//!
//! impl Model for Product {
//!     fn table_name() -> &'static str {
//!         "products"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::builder("postgres://localhost/mydb").build();
//!     let ctx = Context::connect(config).await?;
//!
//!     let mut repo = Repository::<Product>::new(&ctx);
//!     let page = repo
//!         .search(Some(&ConditionGroup::and(vec![KeywordOption::must_match(
//!             "status", "active",
//!         )])))
//!         .search(Some(&ConditionGroup::or(wildcard_options(
//!             &["title_th", "title_en"],
//!             "singh",
//!         ))))
//!         .pagination(&PageOptions::new().with_page(2).with_order("id desc"))
//!         .await?;
//!
//!     println!("{} of {}", page.count, page.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use search_repository::StoreConfig;
//!
//! let config = StoreConfig::builder("postgres://localhost/mydb")
//!     .max_connections(20)     // Pool size (default: 10)
//!     .page_limit_default(20)  // Page size when none is requested (default: 30)
//!     .page_limit_max(200)     // Largest page size served (default: 100)
//!     .build();
//! ```
//!
//! `StoreConfig::from_env()` reads the same settings from `APP_*` variables,
//! loading a `.env` file first when one exists.

pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod page;
pub mod repository;
pub mod sql;
pub mod store;

// Re-export main types for convenience
pub use config::{StoreConfig, StoreConfigBuilder};
pub use context::Context;
pub use error::{ConfigError, ErrorKind, QueryError, RepositoryError, Result};
pub use model::{Model, Preload};
pub use page::{PageOptions, PageResponse, Pagination, paginate, parse_order_by};
pub use repository::Repository;
pub use sql::{
    Clause, Cond, ConditionGroup, KeywordCondition, KeywordOption, KeywordType, Query,
    must_match_options, set_search, set_search_simple, wildcard_options,
};
