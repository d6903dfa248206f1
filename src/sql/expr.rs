//! Filter expressions and rendered statements
//!
//! Fragments are written with `?` placeholders. [`Statement::to_postgres`]
//! numbers them (`$1`, `$2`, ...) right before execution, so rendered SQL
//! can be compared as plain text in tests.
//!
//! String arguments bind as `text`. A [`Expr::Compare`] against a string
//! therefore reads its column as `text` when executed, which lets keyword
//! values such as `"true"` or `"5"` match boolean and numeric columns.

use serde_json::Value;

/// How the members of an [`Expr::Group`] are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    fn separator(&self) -> &'static str {
        match self {
            Conjunction::And => " AND ",
            Conjunction::Or => " OR ",
        }
    }
}

/// A filter fragment
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Hand-written SQL with `?` placeholders and their arguments
    Raw { sql: String, args: Vec<Value> },
    /// `column op ?` against one argument
    Compare {
        column: String,
        op: &'static str,
        arg: Value,
    },
    /// Members combined under one conjunction.
    ///
    /// A group with one member renders bare; two or more render inside one
    /// pair of parentheses.
    Group {
        conjunction: Conjunction,
        exprs: Vec<Expr>,
    },
}

impl Expr {
    pub fn raw(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Expr::Raw {
            sql: sql.into(),
            args,
        }
    }

    pub fn compare(column: impl Into<String>, op: &'static str, arg: Value) -> Self {
        Expr::Compare {
            column: column.into(),
            op,
            arg,
        }
    }

    pub fn and(exprs: Vec<Expr>) -> Self {
        Expr::Group {
            conjunction: Conjunction::And,
            exprs,
        }
    }

    pub fn or(exprs: Vec<Expr>) -> Self {
        Expr::Group {
            conjunction: Conjunction::Or,
            exprs,
        }
    }

    /// True when the fragment would render to nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::Raw { sql, .. } => sql.trim().is_empty(),
            Expr::Compare { column, .. } => column.is_empty(),
            Expr::Group { exprs, .. } => exprs.iter().all(Expr::is_empty),
        }
    }
}

/// Raw SQL that needs parentheses when it sits next to sibling predicates
fn has_conjunction(sql: &str) -> bool {
    let upper = sql.to_uppercase();
    upper.contains(" AND ") || upper.contains(" OR ")
}

/// SQL text with `?` placeholders plus the arguments in placeholder order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
    /// Byte offsets in `sql` right after a column read as `text` on execution
    text_casts: Vec<usize>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
            text_casts: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn push_arg(&mut self, sql: &str, arg: Value) {
        self.sql.push_str(sql);
        self.args.push(arg);
    }

    /// Append another statement, keeping argument order
    pub fn append(&mut self, other: Statement) {
        let offset = self.sql.len();
        self.text_casts
            .extend(other.text_casts.iter().map(|at| at + offset));
        self.sql.push_str(&other.sql);
        self.args.extend(other.args);
    }

    /// Append predicates joined by `AND`
    ///
    /// When more than one predicate is present, raw fragments containing their
    /// own `AND`/`OR` are parenthesized so they cannot change the meaning of
    /// their siblings.
    pub fn push_conditions(&mut self, exprs: &[Expr]) {
        let members: Vec<&Expr> = exprs.iter().filter(|e| !e.is_empty()).collect();
        let wrap = members.len() > 1;
        for (i, expr) in members.into_iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.push_expr(expr, wrap);
        }
    }

    fn push_expr(&mut self, expr: &Expr, wrap_compound: bool) {
        match expr {
            Expr::Raw { sql, args } => {
                if wrap_compound && has_conjunction(sql) {
                    self.sql.push('(');
                    self.sql.push_str(sql);
                    self.sql.push(')');
                } else {
                    self.sql.push_str(sql);
                }
                self.args.extend(args.iter().cloned());
            }
            Expr::Compare { column, op, arg } => {
                self.sql.push_str(column);
                if arg.is_string() {
                    self.text_casts.push(self.sql.len());
                }
                self.sql.push(' ');
                self.sql.push_str(op);
                self.sql.push_str(" ?");
                self.args.push(arg.clone());
            }
            Expr::Group { conjunction, exprs } => {
                let members: Vec<&Expr> = exprs.iter().filter(|e| !e.is_empty()).collect();
                match members.as_slice() {
                    [] => {}
                    [single] => self.push_expr(single, wrap_compound),
                    _ => {
                        self.sql.push('(');
                        for (i, member) in members.iter().enumerate() {
                            if i > 0 {
                                self.push(conjunction.separator());
                            }
                            self.push_expr(member, true);
                        }
                        self.sql.push(')');
                    }
                }
            }
        }
    }

    /// Render with PostgreSQL `$n` placeholders
    ///
    /// `?` inside single- or double-quoted text is left alone. Columns compared
    /// against a string argument get a `::text` cast.
    pub fn to_postgres(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + 8);
        let mut index = 0usize;
        let mut quote: Option<char> = None;
        let mut casts = self.text_casts.iter().copied().peekable();

        for (at, c) in self.sql.char_indices() {
            while casts.next_if_eq(&at).is_some() {
                out.push_str("::text");
            }
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                    out.push(c);
                }
                None => match c {
                    '\'' | '"' => {
                        quote = Some(c);
                        out.push(c);
                    }
                    '?' => {
                        index += 1;
                        out.push('$');
                        out.push_str(&index.to_string());
                    }
                    _ => out.push(c),
                },
            }
        }
        if casts.next_if_eq(&self.sql.len()).is_some() {
            out.push_str("::text");
        }

        out
    }
}
