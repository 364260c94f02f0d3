//! In-process [`DataSource`] over named tables of JSON rows.
//!
//! Evaluates the structured clause model of a [`TableQuery`] directly:
//! predicates, GROUP BY with `COUNT(*)` aggregates, typed HAVING, DISTINCT,
//! UNION, ORDER BY and LIMIT/OFFSET. Raw SQL predicates and joins are
//! reported as unsupported. Every call is recorded so callers can assert
//! which queries ran.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

use super::{DataSource, resolve_preloads};
use crate::Row;
use crate::detect::split_top_level;
use crate::error::SourceError;
use crate::query::{Backend, CompareOp, Condition, TableQuery, Target, is_plain_identifier};
use crate::request::SortDirection;

/// Operations that can be counted and made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Count,
    Scalar,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Fetch => "fetch",
            Operation::Count => "count",
            Operation::Scalar => "scalar",
        }
    }
}

/// Calls recorded by a [`MemorySource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub fetches: usize,
    pub counts: usize,
    pub scalars: usize,
    /// SQL of every call, in call order.
    pub statements: Vec<String>,
}

#[derive(Default)]
pub struct MemorySource {
    tables: HashMap<String, Vec<Row>>,
    backend: Backend,
    stats: Mutex<SourceStats>,
    failures: Mutex<HashSet<Operation>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a table.
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    /// Dialect used for the recorded SQL and dry runs.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Make every subsequent call of `operation` fail.
    pub fn fail_on(&self, operation: Operation) {
        self.failures.lock().insert(operation);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = SourceStats::default();
    }

    fn record(&self, operation: Operation, sql: String) -> Result<(), SourceError> {
        {
            let mut stats = self.stats.lock();
            match operation {
                Operation::Fetch => stats.fetches += 1,
                Operation::Count => stats.counts += 1,
                Operation::Scalar => stats.scalars += 1,
            }
            stats.statements.push(sql);
        }
        if self.failures.lock().contains(&operation) {
            return Err(SourceError::Injected(operation.name()));
        }
        Ok(())
    }

    fn table_rows(&self, name: &str) -> Result<Vec<Row>, SourceError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::UnknownTable(name.to_string()))
    }

    fn evaluate(&self, query: &TableQuery) -> Result<Vec<Row>, SourceError> {
        let source = match query.target() {
            Some(Target::Table(name)) => self.table_rows(name)?,
            Some(Target::Model(model)) => self.table_rows(model.table())?,
            Some(Target::Subquery { query, .. }) => self.evaluate(query)?,
            None => return Err(SourceError::Unsupported("query without a target".into())),
        };
        if query.has_joins() {
            return Err(SourceError::Unsupported("joins".into()));
        }

        let mut rows = Vec::with_capacity(source.len());
        for row in source {
            if matches_all(query.conditions(), &row)? {
                rows.push(row);
            }
        }

        let selection = parse_selection(query.selects())?;
        let group = query.group();
        let grouped = group.is_some_and(|g| !g.columns.is_empty());
        let aggregated = grouped || selection.iter().any(|item| matches!(item.expr, SelectExpr::Count));

        let mut rows = if aggregated {
            let columns = group.map(|g| g.columns.as_slice()).unwrap_or_default();
            let mut collapsed = aggregate(rows, columns, &selection)?;
            if let Some(group) = group {
                let mut kept = Vec::with_capacity(collapsed.len());
                for row in collapsed {
                    if matches_all(&group.having, &row)? {
                        kept.push(row);
                    }
                }
                collapsed = kept;
            }
            collapsed
        } else {
            rows
        };

        if query.unions().is_empty() {
            sort_rows(&mut rows, query);
            if !aggregated {
                rows = project(rows, &selection);
            }
            rows = apply_distinct(rows, query.distinct_columns());
        } else {
            if !aggregated {
                rows = project(rows, &selection);
            }
            rows = apply_distinct(rows, query.distinct_columns());
            let mut dedupe = false;
            for union in query.unions() {
                rows.extend(self.evaluate(&union.query)?);
                dedupe |= !union.all;
            }
            if dedupe {
                rows = dedupe_rows(rows);
            }
            sort_rows(&mut rows, query);
        }

        let offset = query.offset_value().unwrap_or(0);
        let rows = rows.into_iter().skip(usize::try_from(offset).unwrap_or(usize::MAX));
        Ok(match query.limit_value() {
            Some(limit) => rows.take(usize::try_from(limit).unwrap_or(usize::MAX)).collect(),
            None => rows.collect(),
        })
    }
}

#[async_trait]
impl DataSource for MemorySource {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn fetch(&self, query: &TableQuery) -> Result<Vec<Row>, SourceError> {
        self.record(Operation::Fetch, query.to_sql(self.backend))?;
        let preloads = resolve_preloads(query)?;
        let mut rows = self.evaluate(query)?;

        for preload in &preloads {
            let children = match preload.child_query(&rows) {
                Some(child) => self.evaluate(&child)?,
                None => Vec::new(),
            };
            preload.attach(&mut rows, children);
        }
        Ok(rows)
    }

    async fn count(&self, query: &TableQuery) -> Result<i64, SourceError> {
        self.record(Operation::Count, query.count_sql(self.backend))?;
        let rows = self.evaluate(&query.clone().unpaged())?;
        Ok(i64::try_from(rows.len()).unwrap_or(i64::MAX))
    }

    async fn scalar(&self, query: &TableQuery) -> Result<i64, SourceError> {
        self.record(Operation::Scalar, query.to_sql(self.backend))?;
        let rows = self.evaluate(query)?;
        rows.first()
            .and_then(|row| row.values().next())
            .and_then(Value::as_i64)
            .ok_or_else(|| SourceError::Decode("scalar query returned no integer".into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SelectExpr {
    All,
    Column(String),
    Count,
}

#[derive(Debug, Clone, PartialEq)]
struct SelectItem {
    expr: SelectExpr,
    alias: String,
}

fn parse_selection(selects: &[String]) -> Result<Vec<SelectItem>, SourceError> {
    let mut items = Vec::new();
    for select in selects {
        for part in split_top_level(select) {
            items.push(parse_select_item(part)?);
        }
    }
    Ok(items)
}

fn parse_select_item(text: &str) -> Result<SelectItem, SourceError> {
    let text = text.trim();
    let upper = text.to_ascii_uppercase();
    let (expr, alias) = match upper.rfind(" AS ") {
        Some(at) => (text[..at].trim(), Some(text[at + 4..].trim().trim_matches('"'))),
        None => (text, None),
    };
    let normalized: String = expr.chars().filter(|c| !c.is_whitespace()).collect();

    let expr = if expr == "*" {
        SelectExpr::All
    } else if normalized.eq_ignore_ascii_case("COUNT(*)") || normalized.eq_ignore_ascii_case("COUNT(1)") {
        SelectExpr::Count
    } else if is_plain_identifier(&unquote(expr)) {
        SelectExpr::Column(column_key(expr))
    } else {
        return Err(SourceError::Unsupported(format!("select expression `{expr}`")));
    };

    let alias = match (&expr, alias) {
        (_, Some(alias)) => alias.to_string(),
        (SelectExpr::Column(name), None) => name.clone(),
        (SelectExpr::Count, None) => "count".to_string(),
        (SelectExpr::All, None) => String::new(),
    };
    Ok(SelectItem { expr, alias })
}

/// Row key of a possibly quoted, table-qualified column.
fn column_key(column: &str) -> String {
    let column = unquote(column);
    match column.rsplit_once('.') {
        Some((_, key)) => key.to_string(),
        None => column,
    }
}

/// `"users"."age"` and `` `age` `` read as `users.age` and `age`.
fn unquote(column: &str) -> String {
    column.trim().replace(['"', '`'], "")
}

fn lookup<'a>(row: &'a Row, column: &str) -> Result<Option<&'a Value>, SourceError> {
    if let Some(value) = row.get(column) {
        return Ok(Some(value));
    }
    let column = unquote(column);
    let column = column.as_str();
    if let Some(value) = row.get(column) {
        return Ok(Some(value));
    }
    if !is_plain_identifier(column) {
        return Err(SourceError::Unsupported(format!("expression `{column}`")));
    }
    Ok(row.get(&column_key(column)))
}
fn aggregate(rows: Vec<Row>, columns: &[String], selection: &[SelectItem]) -> Result<Vec<Row>, SourceError> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
    for row in rows {
        let mut key = Vec::with_capacity(columns.len());
        for column in columns {
            key.push(lookup(&row, column)?.cloned().unwrap_or(Value::Null));
        }
        let key = Value::Array(key).to_string();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }
    if columns.is_empty() && order.is_empty() {
        // An aggregate without GROUP BY yields one row even over no input.
        order.push(String::new());
        groups.insert(String::new(), Vec::new());
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let members = groups.remove(&key).unwrap_or_default();
        let first = members.first();
        let mut row = Row::new();
        if selection.is_empty() {
            for column in columns {
                let key = column_key(column);
                let value = first.and_then(|r| r.get(&key)).cloned();
                row.insert(key, value.unwrap_or(Value::Null));
            }
        }
        for item in selection {
            match &item.expr {
                SelectExpr::Count => {
                    row.insert(item.alias.clone(), Value::from(members.len()));
                }
                SelectExpr::Column(name) => {
                    let value = first.and_then(|r| r.get(name)).cloned();
                    row.insert(item.alias.clone(), value.unwrap_or(Value::Null));
                }
                SelectExpr::All => {
                    if let Some(first) = first {
                        row.extend(first.clone());
                    }
                }
            }
        }
        out.push(row);
    }
    Ok(out)
}

fn project(rows: Vec<Row>, selection: &[SelectItem]) -> Vec<Row> {
    if selection.is_empty() || selection.iter().all(|item| item.expr == SelectExpr::All) {
        return rows;
    }
    rows.into_iter()
        .map(|row| {
            let mut out = Row::new();
            for item in selection {
                match &item.expr {
                    SelectExpr::All => out.extend(row.clone()),
                    SelectExpr::Column(name) => {
                        out.insert(item.alias.clone(), row.get(name).cloned().unwrap_or(Value::Null));
                    }
                    SelectExpr::Count => {}
                }
            }
            out
        })
        .collect()
}

fn apply_distinct(rows: Vec<Row>, distinct: Option<&[String]>) -> Vec<Row> {
    match distinct {
        None => rows,
        Some([]) => dedupe_rows(rows),
        Some(columns) => {
            let projected = rows
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| {
                            let key = column_key(c);
                            let value = row.get(&key).cloned().unwrap_or(Value::Null);
                            (key, value)
                        })
                        .collect::<Row>()
                })
                .collect();
            dedupe_rows(projected)
        }
    }
}

fn dedupe_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(Value::Object(row.clone()).to_string()))
        .collect()
}

fn sort_rows(rows: &mut [Row], query: &TableQuery) {
    let orders = query.orders();
    if orders.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for order in orders {
            let key = column_key(&order.column);
            let ordering = sort_key_cmp(a.get(&key), b.get(&key));
            let ordering = match order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Total order used for sorting: booleans, numbers, strings, other values,
/// then NULL (NULLs sort last ascending).
fn sort_key_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            Some(Value::Bool(_)) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Array(_) | Value::Object(_)) => 3,
            Some(Value::Null) | None => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn matches_all(conditions: &[Condition], row: &Row) -> Result<bool, SourceError> {
    for condition in conditions {
        if !matches(condition, row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches(condition: &Condition, row: &Row) -> Result<bool, SourceError> {
    Ok(match condition {
        Condition::Compare { column, op, value } => match lookup(row, column)? {
            Some(lhs) if !lhs.is_null() && !value.is_null() => {
                let Some(ordering) = compare(lhs, value) else {
                    return Ok(false);
                };
                match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Gte => ordering != Ordering::Less,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Lte => ordering != Ordering::Greater,
                }
            }
            _ => false,
        },
        Condition::In { column, values } => match lookup(row, column)? {
            Some(lhs) if !lhs.is_null() => values
                .iter()
                .any(|v| compare(lhs, v) == Some(Ordering::Equal)),
            _ => false,
        },
        Condition::IsNull { column } => lookup(row, column)?.is_none_or(Value::is_null),
        Condition::Like {
            column,
            pattern,
            case_insensitive,
        } => match lookup(row, column)?.and_then(text) {
            Some(text) => {
                let text = if *case_insensitive { text.to_lowercase() } else { text };
                like_regex(pattern)?.is_match(&text)
            }
            None => false,
        },
        Condition::Regex {
            column,
            pattern,
            case_insensitive,
        } => match lookup(row, column)?.and_then(text) {
            Some(text) => {
                let pattern = if *case_insensitive {
                    format!("(?i){pattern}")
                } else {
                    pattern.clone()
                };
                Regex::new(&pattern)
                    .map_err(|e| SourceError::Unsupported(format!("regex `{pattern}`: {e}")))?
                    .is_match(&text)
            }
            None => false,
        },
        Condition::Any(list) => {
            for condition in list {
                if matches(condition, row)? {
                    return Ok(true);
                }
            }
            false
        }
        Condition::All(list) => matches_all(list, row)?,
        Condition::Not(inner) => !matches(inner, row)?,
        Condition::Raw { sql, values } => match raw_comparison(sql, values) {
            Some(comparison) => matches(&comparison, row)?,
            None => return Err(SourceError::Unsupported(format!("raw predicate `{sql}`"))),
        },
    })
}

/// Read `<column> <op> <literal>` back into a typed comparison. The literal
/// is a number, a single-quoted string or a `$n` placeholder.
fn raw_comparison(sql: &str, values: &[Value]) -> Option<Condition> {
    const OPERATORS: [(&str, CompareOp); 7] = [
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("<>", CompareOp::Ne),
        ("!=", CompareOp::Ne),
        ("=", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ];
    let (at, token, op) = OPERATORS
        .iter()
        .filter_map(|(token, op)| sql.find(token).map(|at| (at, *token, *op)))
        .min_by_key(|(at, token, _)| (*at, std::cmp::Reverse(token.len())))?;

    let column = sql[..at].trim();
    if !is_plain_identifier(&unquote(column)) {
        return None;
    }
    let literal = sql[at + token.len()..].trim();
    let value = if let Some(n) = literal.strip_prefix('$') {
        values.get(n.parse::<usize>().ok()?.checked_sub(1)?)?.clone()
    } else if let Some(text) = literal.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
        Value::String(text.replace("''", "'"))
    } else {
        serde_json::from_str::<serde_json::Number>(literal).ok().map(Value::Number)?
    };
    Some(Condition::compare(column, op, value))
}

/// Text form of a scalar value, as a string cast would produce it.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

/// Translate a LIKE pattern (backslash escapes) into an anchored regex.
fn like_regex(pattern: &str) -> Result<Regex, SourceError> {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| SourceError::Unsupported(format!("LIKE pattern `{pattern}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Model, Relation};
    use serde_json::json;

    fn rows(values: Value) -> Vec<Row> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn people() -> MemorySource {
        MemorySource::new().with_table(
            "people",
            rows(json!([
                {"id": 1, "name": "John", "age": 30, "team": "a"},
                {"id": 2, "name": "Jane", "age": 25, "team": "a"},
                {"id": 3, "name": "johnny", "age": 40, "team": "b"},
                {"id": 4, "name": "Bob", "age": null, "team": "c"},
            ])),
        )
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[tokio::test]
    async fn filters_sorts_and_pages() {
        let source = people();
        let query = TableQuery::table("people")
            .filter(Condition::gte("age", 25))
            .order_by("age", SortDirection::Desc)
            .offset(1)
            .limit(1);

        let rows = source.fetch(&query).await.unwrap();
        assert_eq!(ids(&rows), vec![1]);
        assert_eq!(source.count(&query).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn like_respects_case_folding() {
        let source = people();
        let sensitive = TableQuery::table("people").filter(Condition::contains("name", "john", false));
        assert_eq!(ids(&source.fetch(&sensitive).await.unwrap()), vec![3]);

        let folded = TableQuery::table("people").filter(Condition::contains("name", "JOHN", true));
        assert_eq!(ids(&source.fetch(&folded).await.unwrap()), vec![1, 3]);
    }

    #[tokio::test]
    async fn like_matches_numbers_as_text() {
        let source = people();
        let query = TableQuery::table("people").filter(Condition::contains("age", "4", false));
        assert_eq!(ids(&source.fetch(&query).await.unwrap()), vec![3]);
    }

    #[tokio::test]
    async fn group_by_collapses_rows() {
        let source = people();
        let query = TableQuery::table("people")
            .select("team, COUNT(*) AS members")
            .group_by(["team"])
            .having(Condition::gt("members", 1));

        let rows = source.fetch(&query).await.unwrap();
        assert_eq!(rows, vec![json!({"team": "a", "members": 2}).as_object().cloned().unwrap()]);
        assert_eq!(source.count(&query).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scalar_counts_subquery_rows() {
        let source = people();
        let grouped = TableQuery::table("people").group_by(["team"]);
        let wrapper = TableQuery::subquery(grouped, "subquery").select("COUNT(*) AS count");

        assert_eq!(source.scalar(&wrapper).await.unwrap(), 3);
        assert_eq!(source.stats().scalars, 1);
    }

    #[tokio::test]
    async fn distinct_on_column_counts_distinct_values() {
        let source = people();
        let query = TableQuery::table("people").distinct_on(["team"]);
        assert_eq!(source.count(&query).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn union_all_appends_rows() {
        let source = people();
        let query = TableQuery::table("people")
            .select("id")
            .filter(Condition::eq("team", "a"))
            .union_all(TableQuery::table("people").select("id").filter(Condition::eq("team", "c")))
            .order_by("id", SortDirection::Desc);

        assert_eq!(ids(&source.fetch(&query).await.unwrap()), vec![4, 2, 1]);
    }

    #[tokio::test]
    async fn preloads_attach_children() {
        let source = people().with_table(
            "pets",
            rows(json!([
                {"id": 10, "owner_id": 1, "kind": "cat"},
                {"id": 11, "owner_id": 1, "kind": "dog"},
                {"id": 12, "owner_id": 3, "kind": "fish"},
            ])),
        );
        let model = Model::new("people").relation(Relation::has_many("pets", "pets", "owner_id"));
        let query = TableQuery::model(model).preload("pets").order_by("id", SortDirection::Asc);

        let rows = source.fetch(&query).await.unwrap();
        assert_eq!(rows[0]["pets"].as_array().unwrap().len(), 2);
        assert_eq!(rows[1]["pets"], json!([]));
        assert_eq!(rows[2]["pets"][0]["kind"], json!("fish"));
    }

    #[tokio::test]
    async fn simple_raw_comparisons_are_evaluated() {
        let source = people();
        let raw = TableQuery::table("people").filter(Condition::raw(r#""team" <> 'a'"#));
        assert_eq!(source.count(&raw).await.unwrap(), 2);

        let bound = TableQuery::table("people").filter(Condition::raw_with("id >= $1", vec![json!(3)]));
        assert_eq!(source.count(&bound).await.unwrap(), 2);

        let grouped = TableQuery::table("people")
            .select("team, COUNT(*) AS members")
            .group_by(["team"])
            .having(Condition::raw("members > 1"));
        assert_eq!(source.count(&grouped).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn raw_predicates_and_joins_are_unsupported() {
        let source = people();
        let raw = TableQuery::table("people").filter(Condition::raw("LENGTH(name) > 1"));
        assert!(matches!(source.fetch(&raw).await, Err(SourceError::Unsupported(_))));

        let joined = TableQuery::table("people").inner_join("pets", "pets.owner_id", "people.id");
        assert!(matches!(source.count(&joined).await, Err(SourceError::Unsupported(_))));
    }

    #[tokio::test]
    async fn unknown_table_is_reported() {
        let source = people();
        let err = source.fetch(&TableQuery::table("ghosts")).await.unwrap_err();
        assert!(matches!(err, SourceError::UnknownTable(name) if name == "ghosts"));
    }

    #[tokio::test]
    async fn injected_failures_and_stats() {
        let source = people();
        source.fail_on(Operation::Count);

        let query = TableQuery::table("people");
        assert!(matches!(
            source.count(&query).await,
            Err(SourceError::Injected("count"))
        ));
        assert!(source.fetch(&query).await.is_ok());

        let stats = source.stats();
        assert_eq!((stats.fetches, stats.counts, stats.scalars), (1, 1, 0));
        assert_eq!(stats.statements[0], r#"SELECT COUNT(*) FROM "people""#);

        source.clear_failures();
        source.reset_stats();
        assert_eq!(source.count(&query).await.unwrap(), 4);
    }

    #[test]
    fn like_pattern_translation() {
        assert!(like_regex("%jo\\%n%").unwrap().is_match("a jo%n b"));
        assert!(!like_regex("%jo\\%n%").unwrap().is_match("a join b"));
        assert!(like_regex("j_n").unwrap().is_match("jan"));
        assert!(!like_regex("j_n").unwrap().is_match("joan"));
    }

    #[test]
    fn nulls_sort_last() {
        let null = Value::Null;
        let one = json!(1);
        assert_eq!(sort_key_cmp(Some(&one), Some(&null)), Ordering::Less);
        assert_eq!(sort_key_cmp(None, Some(&one)), Ordering::Greater);
    }
}
