//! Paging requests, responses and the paginator

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, postgres::PgRow};

use crate::config::StoreConfig;
use crate::sql::query::Query;
use crate::sql::sanitize::{is_column_reference, normalize_sort_directive};
use crate::store;

static BRACKET_ORDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)\(([^()\s]+)\)$").unwrap());

/// What a client asked for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageOptions {
    pub q: String,
    pub limit: i64,
    pub page: i64,
    #[serde(rename = "orderBy")]
    pub order_by: Vec<String>,
}

impl PageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_q(mut self, q: impl Into<String>) -> Self {
        self.q = q.into();
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    /// Append one sort directive, e.g. `"created_at desc"`
    pub fn with_order(mut self, directive: impl Into<String>) -> Self {
        self.order_by.push(directive.into());
        self
    }

    /// Clamp the request into what the store serves
    ///
    /// - `limit <= 0` becomes `config.page_limit_default`
    /// - `limit > config.page_limit_max` becomes the max
    /// - `page < 1` becomes 1
    /// - sort directives that are not `column [ASC|DESC]` are dropped
    pub fn normalized(&self, config: &StoreConfig) -> Self {
        let limit = if self.limit <= 0 {
            config.page_limit_default
        } else {
            self.limit.min(config.page_limit_max)
        };

        Self {
            q: self.q.clone(),
            limit,
            page: self.page.max(1),
            order_by: self
                .order_by
                .iter()
                .filter_map(|d| normalize_sort_directive(d))
                .collect(),
        }
    }

    /// Rows skipped before this page, saturating at `i64::MAX`
    pub fn offset(&self) -> i64 {
        self.limit.max(0).saturating_mul(self.page.max(1) - 1)
    }

    /// Read `q`, `limit`, `page` and `order_by` from request query parameters
    ///
    /// Numbers that fail to parse count as 0 before normalization. `order_by`
    /// is read with [`parse_order_by`].
    pub fn from_query_pairs<I, K, V>(pairs: I, config: &StoreConfig) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "q" => options.q = value.to_string(),
                "limit" => options.limit = value.trim().parse().unwrap_or(0),
                "page" => options.page = value.trim().parse().unwrap_or(0),
                "order_by" | "orderBy" => options.order_by = parse_order_by(value),
                _ => {}
            }
        }
        options.normalized(config)
    }
}

/// Parse a comma separated sort parameter
///
/// Each entry is `column`, `column asc|desc` or `asc(column)`/`desc(column)`.
/// A missing or unknown direction means descending. Malformed entries are
/// dropped.
pub fn parse_order_by(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|entry| parse_order_entry(entry.trim()))
        .collect()
}

fn parse_order_entry(entry: &str) -> Option<String> {
    let (column, direction) = match BRACKET_ORDER.captures(entry) {
        Some(caps) => (caps.get(2)?.as_str(), caps.get(1)?.as_str()),
        None => {
            let parts: Vec<&str> = entry.split(' ').collect();
            match parts.as_slice() {
                [column] => (*column, ""),
                [column, direction] => (*column, *direction),
                _ => return None,
            }
        }
    };

    if !is_column_reference(column) {
        return None;
    }

    let direction = if direction.eq_ignore_ascii_case("asc") {
        "asc"
    } else {
        "desc"
    };
    Some(format!("{} {}", column, direction))
}

/// Metadata of one served page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    /// Rows matching the filter, ignoring limit and offset
    pub total: i64,
    pub limit: i64,
    /// Rows in this page
    pub count: i64,
    pub page: i64,
    pub q: String,
    #[serde(rename = "orderBy")]
    pub order_by: Vec<String>,
}

/// A page of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination<M> {
    pub page: i64,
    pub total: i64,
    pub limit: i64,
    pub count: i64,
    pub items: Vec<M>,
}

impl<M> Pagination<M> {
    pub fn new(items: Vec<M>, response: &PageResponse) -> Self {
        Self {
            page: response.page,
            total: response.total,
            limit: response.limit,
            count: response.count,
            items,
        }
    }
}

/// Count and fetch one page of `query`
///
/// `options` should already be normalized; page and limit are still raised
/// to at least 1 and the offset saturates, so any request yields a bounded
/// window. The total comes from a separate `COUNT(*)` without order or window.
pub async fn paginate<M>(
    pool: &PgPool,
    query: &Query,
    options: &PageOptions,
) -> Result<(Vec<M>, PageResponse), sqlx::Error>
where
    M: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let window = PageOptions {
        limit: options.limit.max(1),
        page: options.page.max(1),
        ..PageOptions::default()
    };
    let (page, limit) = (window.page, window.limit);

    let mut windowed = query.clone();
    for directive in &options.order_by {
        windowed.order(directive.clone());
    }

    let total = store::count(pool, &windowed.build_count(&[])).await?;

    windowed.limit(limit).offset(window.offset());
    let items: Vec<M> = store::fetch_all(pool, &windowed.build_select(&[])).await?;

    let response = PageResponse {
        total,
        limit,
        count: items.len() as i64,
        page,
        q: options.q.clone(),
        order_by: options.order_by.clone(),
    };

    Ok((items, response))
}
