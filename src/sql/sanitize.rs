//! SQL Identifier Sanitization Utilities
//!
//! Quoting for identifiers the crate generates itself, and validation for
//! identifiers that arrive as caller data (keyword columns, sort directives).

use regex::Regex;
use std::sync::LazyLock;

static COLUMN_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap()
});

static SORT_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)(?:\s+(asc|desc))?$")
        .unwrap()
});

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Example
/// ```
/// use search_repository::sql::quote_identifier;
///
/// let quoted = quote_identifier("my_table");
/// assert_eq!(quoted, "\"my_table\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    // Escape any double quotes in the identifier by doubling them
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Quote a `table.column` pair
pub fn quote_qualified(table: &str, column: &str) -> String {
    format!("{}.{}", quote_identifier(table), quote_identifier(column))
}

/// Quote a column given as `column` or `table.column`
pub fn quote_column(name: &str) -> String {
    match name.split_once('.') {
        Some((table, column)) => quote_qualified(table, column),
        None => quote_identifier(name),
    }
}

/// Whether `name` is a plain column reference: `column` or `table.column`
///
/// Keyword search columns are spliced into SQL unquoted, so anything else
/// is rejected.
pub fn is_column_reference(name: &str) -> bool {
    COLUMN_REFERENCE.is_match(name)
}

/// Normalize a client sort directive such as `"created_at desc"`
///
/// Returns `None` when the directive is not `column [ASC|DESC]`.
///
/// # Example
/// ```
/// use search_repository::sql::normalize_sort_directive;
///
/// assert_eq!(normalize_sort_directive("id desc").as_deref(), Some("id DESC"));
/// assert_eq!(normalize_sort_directive("name").as_deref(), Some("name ASC"));
/// assert!(normalize_sort_directive("id; DROP TABLE users").is_none());
/// ```
pub fn normalize_sort_directive(directive: &str) -> Option<String> {
    let caps = SORT_DIRECTIVE.captures(directive.trim())?;
    let column = caps.get(1)?.as_str();
    let order = caps
        .get(2)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_else(|| "ASC".to_string());
    Some(format!("{} {}", column, order))
}
