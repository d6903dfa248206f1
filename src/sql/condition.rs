//! Keyword condition compiler
//!
//! Turns a declarative [`ConditionGroup`] into an [`Expr`] that is ANDed
//! onto a [`Query`]'s existing filters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sql::expr::Expr;
use crate::sql::query::Query;
use crate::sql::sanitize::is_column_reference;

/// How a single keyword is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordType {
    /// Exact equality: `column = value`
    MustMatch,
    /// Substring match: `column LIKE %value%`
    Wildcard,
}

/// How the options of a group are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordCondition {
    And,
    Or,
}

/// One atomic keyword predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordOption {
    #[serde(rename = "type")]
    pub kind: KeywordType,
    /// Column the keyword is compared against
    pub key: String,
    pub value: Value,
}

impl KeywordOption {
    pub fn must_match(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: KeywordType::MustMatch,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn wildcard(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: KeywordType::Wildcard,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether this option takes part in compilation
    ///
    /// Empty keys, empty values (`""` or `null`) and keys that are not plain
    /// column references are skipped.
    pub fn is_applicable(&self) -> bool {
        let has_value = match &self.value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        };
        !self.key.is_empty() && has_value && is_column_reference(&self.key)
    }

    fn compile(&self) -> Expr {
        match self.kind {
            KeywordType::MustMatch => Expr::compare(&self.key, "=", self.value.clone()),
            KeywordType::Wildcard => {
                let text = match &self.value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Expr::compare(&self.key, "LIKE", Value::String(format!("%{}%", text)))
            }
        }
    }
}

/// A boolean combination of keyword options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub condition: KeywordCondition,
    pub options: Vec<KeywordOption>,
}

impl ConditionGroup {
    pub fn and(options: Vec<KeywordOption>) -> Self {
        Self {
            condition: KeywordCondition::And,
            options,
        }
    }

    pub fn or(options: Vec<KeywordOption>) -> Self {
        Self {
            condition: KeywordCondition::Or,
            options,
        }
    }

    /// Compile the group into a filter fragment
    ///
    /// - no applicable option: `None`
    /// - one applicable option: a bare predicate, no parentheses
    /// - more: a parenthesized group under this group's conjunction
    pub fn compile(&self) -> Option<Expr> {
        let mut exprs: Vec<Expr> = self
            .options
            .iter()
            .filter(|option| option.is_applicable())
            .map(KeywordOption::compile)
            .collect();

        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(match self.condition {
                KeywordCondition::And => Expr::and(exprs),
                KeywordCondition::Or => Expr::or(exprs),
            }),
        }
    }
}

/// One MustMatch option per key, all sharing `value`
pub fn must_match_options<K>(keys: &[K], value: impl Into<Value>) -> Vec<KeywordOption>
where
    K: AsRef<str>,
{
    let value = value.into();
    keys.iter()
        .map(|key| KeywordOption::must_match(key.as_ref(), value.clone()))
        .collect()
}

/// One Wildcard option per key, all sharing `value`
pub fn wildcard_options<K>(keys: &[K], value: impl Into<Value>) -> Vec<KeywordOption>
where
    K: AsRef<str>,
{
    let value = value.into();
    keys.iter()
        .map(|key| KeywordOption::wildcard(key.as_ref(), value.clone()))
        .collect()
}

/// AND the compiled group onto the query's filters
///
/// A missing group, or one with no applicable option, leaves the query as is.
pub fn set_search(query: &mut Query, group: Option<&ConditionGroup>) {
    if let Some(expr) = group.and_then(ConditionGroup::compile) {
        query.push_filter(expr);
    }
}

/// Free-text search: `q` as a substring of any of `columns`
pub fn set_search_simple<K>(query: &mut Query, q: &str, columns: &[K])
where
    K: AsRef<str>,
{
    let group = ConditionGroup::or(wildcard_options(columns, q));
    set_search(query, Some(&group));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn where_sql(query: &Query) -> String {
        query.where_statement().map(|s| s.sql).unwrap_or_default()
    }

    fn fresh() -> Query {
        Query::new("test_table")
    }

    #[test]
    fn test_single_must_match_is_bare() {
        let mut query = fresh();
        set_search(
            &mut query,
            Some(&ConditionGroup::and(vec![KeywordOption::must_match("id", "p011")])),
        );

        let stmt = query.where_statement().unwrap();
        assert_eq!(stmt.sql, "id = ?");
        assert_eq!(stmt.args, vec![json!("p011")]);
    }

    #[test]
    fn test_single_wildcard_is_bare() {
        let mut query = fresh();
        set_search(
            &mut query,
            Some(&ConditionGroup::or(vec![KeywordOption::wildcard("name", "singh")])),
        );

        let stmt = query.where_statement().unwrap();
        assert_eq!(stmt.sql, "name LIKE ?");
        assert_eq!(stmt.args, vec![json!("%singh%")]);
    }

    #[test]
    fn test_and_group_then_or_group() {
        let mut query = fresh();
        set_search(
            &mut query,
            Some(&ConditionGroup::and(vec![
                KeywordOption::must_match("id", "p011"),
                KeywordOption::must_match("is_active", "true"),
            ])),
        );
        set_search(
            &mut query,
            Some(&ConditionGroup::or(wildcard_options(
                &["title_th", "title_en", "title_jp", "title_cn"],
                "singh",
            ))),
        );

        let stmt = query.where_statement().unwrap();
        assert_eq!(
            stmt.sql,
            "(id = ? AND is_active = ?) AND (title_th LIKE ? OR title_en LIKE ? OR title_jp LIKE ? OR title_cn LIKE ?)"
        );
        assert_eq!(
            stmt.args,
            vec![
                json!("p011"),
                json!("true"),
                json!("%singh%"),
                json!("%singh%"),
                json!("%singh%"),
                json!("%singh%"),
            ]
        );
    }

    #[test]
    fn test_or_group_with_mixed_kinds() {
        let mut query = fresh();
        set_search(
            &mut query,
            Some(&ConditionGroup::or(vec![
                KeywordOption::must_match("id", "p011"),
                KeywordOption::wildcard("name", "singh"),
            ])),
        );
        set_search(
            &mut query,
            Some(&ConditionGroup::or(wildcard_options(&["title_th", "title_en"], "singh"))),
        );

        assert_eq!(
            where_sql(&query),
            "(id = ? OR name LIKE ?) AND (title_th LIKE ? OR title_en LIKE ?)"
        );
    }

    #[test]
    fn test_wildcard_and_group_then_must_match_group() {
        let mut query = fresh();
        set_search(
            &mut query,
            Some(&ConditionGroup::and(vec![
                KeywordOption::wildcard("id", "p011"),
                KeywordOption::wildcard("name", "singh"),
            ])),
        );
        set_search(
            &mut query,
            Some(&ConditionGroup::and(must_match_options(&["title_th", "title_en"], "singh"))),
        );

        assert_eq!(
            where_sql(&query),
            "(id LIKE ? AND name LIKE ?) AND (title_th = ? AND title_en = ?)"
        );
    }

    #[test]
    fn test_wrong_operator_is_not_rendered() {
        let mut query = fresh();
        set_search(
            &mut query,
            Some(&ConditionGroup::and(vec![
                KeywordOption::must_match("id", "p011"),
                KeywordOption::must_match("is_active", "true"),
            ])),
        );

        assert_ne!(where_sql(&query), "(id = ? OR is_active = ?)");
    }

    #[test]
    fn test_simple_search_single_column() {
        let mut query = fresh();
        set_search_simple(&mut query, "singh", &["title"]);

        let stmt = query.where_statement().unwrap();
        assert_eq!(stmt.sql, "title LIKE ?");
        assert_eq!(stmt.args, vec![json!("%singh%")]);
    }

    #[test]
    fn test_simple_search_then_and_group() {
        let mut query = fresh();
        set_search_simple(&mut query, "singh", &["title_th", "title_en"]);
        set_search(
            &mut query,
            Some(&ConditionGroup::and(vec![
                KeywordOption::must_match("name", "singh"),
                KeywordOption::must_match("age", "18"),
            ])),
        );

        assert_eq!(
            where_sql(&query),
            "(title_th LIKE ? OR title_en LIKE ?) AND (name = ? AND age = ?)"
        );
    }

    #[test]
    fn test_singleton_then_group_arguments() {
        let mut query = fresh();
        set_search_simple(&mut query, "s01", &["id"]);
        set_search(
            &mut query,
            Some(&ConditionGroup::and(vec![
                KeywordOption::must_match("title_th", "singh"),
                KeywordOption::must_match("title_en", "singh"),
            ])),
        );

        let stmt = query.where_statement().unwrap();
        assert_eq!(stmt.sql, "id LIKE ? AND (title_th = ? AND title_en = ?)");
        assert_eq!(stmt.args, vec![json!("%s01%"), json!("singh"), json!("singh")]);
    }

    #[test]
    fn test_existing_filters_are_kept_in_front() {
        let mut query = fresh();
        query.push_filter(Expr::raw("something = ?", vec![json!("sometime")]));
        query.push_filter(Expr::raw("something1 = ?", vec![json!("sometime2")]));
        assert_eq!(where_sql(&query), "something = ? AND something1 = ?");

        set_search_simple(&mut query, "singh", &["title_th", "title_en"]);

        let stmt = query.where_statement().unwrap();
        assert_eq!(
            stmt.sql,
            "something = ? AND something1 = ? AND (title_th LIKE ? OR title_en LIKE ?)"
        );
        assert_eq!(stmt.args[0], json!("sometime"));
        assert_eq!(stmt.args[1], json!("sometime2"));
    }

    #[test]
    fn test_compiling_twice_is_identical() {
        let group = ConditionGroup::or(vec![
            KeywordOption::must_match("id", "p011"),
            KeywordOption::wildcard("name", "singh"),
        ]);

        let mut first = fresh();
        let mut second = fresh();
        set_search(&mut first, Some(&group));
        set_search(&mut second, Some(&group));

        assert_eq!(first.where_statement(), second.where_statement());
        assert_eq!(group.compile(), group.compile());
    }

    #[test]
    fn test_empty_options_are_dropped() {
        let group = ConditionGroup::or(vec![
            KeywordOption::wildcard("", "singh"),
            KeywordOption::wildcard("title_th", ""),
            KeywordOption::must_match("title_en", Value::Null),
            KeywordOption::wildcard("title_jp", "singh"),
        ]);

        let mut query = fresh();
        set_search(&mut query, Some(&group));

        assert_eq!(where_sql(&query), "title_jp LIKE ?");
    }

    #[test]
    fn test_no_applicable_option_is_noop() {
        let mut query = fresh();
        set_search(&mut query, Some(&ConditionGroup::and(vec![])));
        set_search(
            &mut query,
            Some(&ConditionGroup::or(wildcard_options(&["title"], ""))),
        );
        set_search(&mut query, None);
        set_search_simple::<&str>(&mut query, "singh", &[]);

        assert!(query.where_statement().is_none());
    }

    #[test]
    fn test_invalid_column_is_not_applicable() {
        let option = KeywordOption::must_match("id = 1 OR 1", "x");
        assert!(!option.is_applicable());
        assert!(ConditionGroup::and(vec![option]).compile().is_none());
    }

    #[test]
    fn test_non_string_values() {
        let group = ConditionGroup::and(vec![
            KeywordOption::must_match("age", 18),
            KeywordOption::wildcard("code", 42),
        ]);

        let mut query = fresh();
        set_search(&mut query, Some(&group));

        let stmt = query.where_statement().unwrap();
        assert_eq!(stmt.sql, "(age = ? AND code LIKE ?)");
        assert_eq!(stmt.args, vec![json!(18), json!("%42%")]);
    }

    #[test]
    fn test_string_values_match_typed_columns() {
        let mut query = fresh();
        set_search(
            &mut query,
            Some(&ConditionGroup::and(vec![
                KeywordOption::must_match("id", "p011"),
                KeywordOption::must_match("is_active", "true"),
                KeywordOption::must_match("qty", 5),
            ])),
        );
        set_search_simple(&mut query, "5", &["qty"]);

        let stmt = query.where_statement().unwrap();
        assert_eq!(stmt.sql, "(id = ? AND is_active = ? AND qty = ?) AND qty LIKE ?");
        assert_eq!(
            stmt.to_postgres(),
            "(id::text = $1 AND is_active::text = $2 AND qty = $3) AND qty::text LIKE $4"
        );
    }

    #[test]
    fn test_options_helpers() {
        let options = must_match_options(&["a", "b"], "v");
        assert_eq!(options.len(), 2);
        assert!(options.iter().all(|o| o.kind == KeywordType::MustMatch));
        assert_eq!(options[1].key, "b");

        let keys = vec!["x".to_string()];
        let options = wildcard_options(&keys, "v");
        assert_eq!(options[0].kind, KeywordType::Wildcard);

        assert!(wildcard_options::<&str>(&[], "v").is_empty());
    }

    #[test]
    fn test_group_deserializes() {
        let group: ConditionGroup = serde_json::from_value(json!({
            "condition": "or",
            "options": [
                {"type": "must_match", "key": "id", "value": "p011"},
                {"type": "wildcard", "key": "name", "value": "singh"}
            ]
        }))
        .unwrap();

        assert_eq!(group.condition, KeywordCondition::Or);
        assert_eq!(group.options[1].kind, KeywordType::Wildcard);
    }
}
