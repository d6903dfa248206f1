//! SQL generation
//!
//! Identifier sanitization, filter expressions, the keyword condition compiler
//! and the query accumulator.

pub mod condition;
pub mod expr;
pub mod query;
pub mod sanitize;

pub use condition::{
    ConditionGroup, KeywordCondition, KeywordOption, KeywordType, must_match_options,
    set_search, set_search_simple, wildcard_options,
};
pub use expr::{Conjunction, Expr, Statement};
pub use query::{Clause, Cond, Query};
pub use sanitize::{
    is_column_reference, normalize_sort_directive, quote_column, quote_identifier,
    quote_qualified,
};
