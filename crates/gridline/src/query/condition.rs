use sea_query::{Alias, Cond, Expr, Func, LikeExpr, SimpleExpr};
use serde_json::Value;

use super::render::{Backend, column_expr, sql_value};

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A boolean predicate over row columns.
///
/// Column references are either plain identifiers (`age`, `users.age`) or raw
/// SQL expressions; values are JSON values bound as parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    IsNull {
        column: String,
    },
    /// SQL LIKE. With `case_insensitive` the column is wrapped in `LOWER()`
    /// and the pattern is expected to be lower-cased already.
    Like {
        column: String,
        pattern: String,
        case_insensitive: bool,
    },
    Regex {
        column: String,
        pattern: String,
        case_insensitive: bool,
    },
    Any(Vec<Condition>),
    All(Vec<Condition>),
    Not(Box<Condition>),
    /// Raw SQL fragment with `$n` placeholders bound to `values`.
    Raw {
        sql: String,
        values: Vec<Value>,
    },
}

impl Condition {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lte, value)
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Condition::IsNull {
            column: column.into(),
        }
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::Like {
            column: column.into(),
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    /// Substring match: `column LIKE '%value%'` with wildcards in `value`
    /// escaped. Case-insensitive matching lower-cases both sides.
    pub fn contains(column: impl Into<String>, value: &str, case_insensitive: bool) -> Self {
        let value = if case_insensitive {
            value.to_lowercase()
        } else {
            value.to_string()
        };
        Condition::Like {
            column: column.into(),
            pattern: format!("%{}%", escape_like_wildcards(&value)),
            case_insensitive,
        }
    }

    pub fn regex(column: impl Into<String>, pattern: impl Into<String>, case_insensitive: bool) -> Self {
        Condition::Regex {
            column: column.into(),
            pattern: pattern.into(),
            case_insensitive,
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any(conditions)
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All(conditions)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::raw_with(sql, Vec::new())
    }

    pub fn raw_with(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::Raw {
            sql: sql.into(),
            values,
        }
    }

    /// Render as a SeaQuery expression for `backend`.
    pub fn to_expr(&self, backend: Backend) -> SimpleExpr {
        match self {
            Condition::Compare { column, op, value } => {
                let col = column_expr(column);
                let value = sql_value(value);
                match op {
                    CompareOp::Eq => col.eq(value),
                    CompareOp::Ne => col.ne(value),
                    CompareOp::Gt => col.gt(value),
                    CompareOp::Gte => col.gte(value),
                    CompareOp::Lt => col.lt(value),
                    CompareOp::Lte => col.lte(value),
                }
            }
            Condition::In { column, values } => {
                column_expr(column).is_in(values.iter().map(sql_value))
            }
            Condition::IsNull { column } => column_expr(column).is_null(),
            Condition::Like {
                column,
                pattern,
                case_insensitive,
            } => {
                let col = text_expr(column, backend);
                let col = if *case_insensitive {
                    Expr::expr(Func::lower(col))
                } else {
                    col
                };
                // SQLite has no default LIKE escape character.
                match backend {
                    Backend::Sqlite => col.like(LikeExpr::new(pattern.clone()).escape('\\')),
                    Backend::Postgres | Backend::MySql => col.like(pattern.clone()),
                }
            }
            Condition::Regex {
                column,
                pattern,
                case_insensitive,
            } => {
                // Placeholders follow the backend: numbered `$n` on Postgres,
                // positional `?` elsewhere.
                let template = match (backend, case_insensitive) {
                    (Backend::Postgres, false) => "$1 ~ $2",
                    (Backend::Postgres, true) => "$1 ~* $2",
                    (Backend::MySql | Backend::Sqlite, _) => "? REGEXP ?",
                };
                let pattern = if *case_insensitive && backend != Backend::Postgres {
                    format!("(?i){pattern}")
                } else {
                    pattern.clone()
                };
                Expr::cust_with_exprs(
                    template,
                    [
                        SimpleExpr::from(text_expr(column, backend)),
                        SimpleExpr::from(Expr::val(pattern)),
                    ],
                )
            }
            Condition::Any(list) => list
                .iter()
                .fold(Cond::any(), |cond, c| cond.add(c.to_expr(backend)))
                .into(),
            Condition::All(list) => list
                .iter()
                .fold(Cond::all(), |cond, c| cond.add(c.to_expr(backend)))
                .into(),
            Condition::Not(inner) => Cond::all().add(inner.to_expr(backend)).not().into(),
            Condition::Raw { sql, values } if values.is_empty() => Expr::cust(sql.clone()),
            Condition::Raw { sql, values } => match backend {
                Backend::Postgres => Expr::cust_with_values(sql.clone(), values.iter().map(sql_value)),
                Backend::MySql | Backend::Sqlite => {
                    let (sql, values) = positional_placeholders(sql, values);
                    Expr::cust_with_values(sql, values.iter().map(sql_value))
                }
            },
        }
    }
}

/// Column as text for pattern matching. Postgres has no implicit cast from
/// numbers to text, so LIKE and `~` on an integer column need one.
fn text_expr(column: &str, backend: Backend) -> Expr {
    match backend {
        Backend::Postgres => Expr::expr(Func::cast_as(column_expr(column), Alias::new("TEXT"))),
        Backend::MySql | Backend::Sqlite => column_expr(column),
    }
}

/// Rewrite `$n` placeholders as `?`, reordering `values` to match. Text
/// inside single quotes is left alone.
fn positional_placeholders(sql: &str, values: &[Value]) -> (String, Vec<Value>) {
    let mut out = String::with_capacity(sql.len());
    let mut ordered = Vec::with_capacity(values.len());
    let mut quoted = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\'' {
            quoted = !quoted;
        }
        if c != '$' || quoted {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            digits.push(d);
        }
        match digits.parse::<usize>().ok().and_then(|n| values.get(n.checked_sub(1)?)) {
            Some(value) => {
                out.push('?');
                ordered.push(value.clone());
            }
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    (out, ordered)
}

/// Escape LIKE wildcard characters so user input matches literally.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
