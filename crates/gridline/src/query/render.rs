//! SQL rendering of [`TableQuery`] through SeaQuery.

use sea_query::{
    Alias, Asterisk, Expr, IntoTableRef, JoinType, MysqlQueryBuilder, Order,
    PostgresQueryBuilder, Query, SelectStatement, SimpleExpr, SqliteQueryBuilder, TableRef,
    UnionType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JoinKind, JoinOn, TableQuery, Target};
use crate::SortDirection;

/// SQL dialect used for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    MySql,
    Sqlite,
}

/// Alias of the derived table wrapped around grouped, unioned and DISTINCT
/// queries when counting.
pub const COUNT_ALIAS: &str = "count_table";

impl TableQuery {
    /// Build the SeaQuery statement for this query.
    pub fn to_select(&self, backend: Backend) -> SelectStatement {
        let mut select = Query::select();

        match self.distinct_columns() {
            Some(columns) if !columns.is_empty() => {
                select.distinct();
                for column in columns {
                    select.expr(column_expr(column));
                }
            }
            distinct => {
                if distinct.is_some() {
                    select.distinct();
                }
                self.push_selection(&mut select);
            }
        }

        match self.target() {
            Some(Target::Table(name)) => {
                select.from(table_ref(name));
            }
            Some(Target::Model(model)) => {
                select.from(table_ref(model.table()));
            }
            Some(Target::Subquery { query, alias }) => {
                select.from_subquery(query.to_select(backend), Alias::new(alias));
            }
            None => {}
        }

        for join in self.joins() {
            let on: SimpleExpr = match &join.on {
                JoinOn::Columns(left, right) => column_expr(left).eq(SimpleExpr::from(column_expr(right))),
                JoinOn::Raw(sql) => Expr::cust(sql.clone()),
            };
            let kind = match join.kind {
                JoinKind::Inner => JoinType::InnerJoin,
                JoinKind::Left => JoinType::LeftJoin,
                JoinKind::Right => JoinType::RightJoin,
            };
            match &join.alias {
                Some(alias) => {
                    select.join_as(kind, table_ref(&join.table), Alias::new(alias), on);
                }
                None => {
                    select.join(kind, table_ref(&join.table), on);
                }
            }
        }

        for condition in self.conditions() {
            select.and_where(condition.to_expr(backend));
        }

        if let Some(group) = self.group() {
            if !group.columns.is_empty() {
                select.add_group_by(
                    group
                        .columns
                        .iter()
                        .map(|c| SimpleExpr::from(column_expr(c)))
                        .collect::<Vec<_>>(),
                );
            }
            for condition in &group.having {
                select.and_having(condition.to_expr(backend));
            }
        }

        for union in self.unions() {
            let kind = if union.all {
                UnionType::All
            } else {
                UnionType::Distinct
            };
            select.union(kind, union.query.to_select(backend));
        }

        for order in self.orders() {
            let direction = match order.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            select.order_by_expr(column_expr(&order.column).into(), direction);
        }

        if let Some(limit) = self.limit_value() {
            select.limit(limit);
        }
        if let Some(offset) = self.offset_value() {
            select.offset(offset);
        }

        select
    }

    /// Render the query as SQL text without executing it.
    pub fn to_sql(&self, backend: Backend) -> String {
        build(&self.to_select(backend), backend)
    }

    /// Statement counting the rows this query would return, ignoring
    /// ORDER BY, LIMIT and OFFSET.
    ///
    /// A DISTINCT column list counts `COUNT(DISTINCT ...)`. Grouped, unioned
    /// and bare DISTINCT queries are counted through a derived table.
    pub fn count_statement(&self, backend: Backend) -> SelectStatement {
        let inner = self.clone().unpaged();
        let grouped = inner.has_clause(super::ClauseKind::GroupBy);
        let unioned = inner.has_clause(super::ClauseKind::Union);
        let distinct = inner.distinct_columns().map(<[String]>::to_vec);

        let wrap = grouped || unioned || distinct.as_ref().is_some_and(Vec::is_empty);
        if wrap {
            let mut count = Query::select();
            count
                .expr(Expr::col(Asterisk).count())
                .from_subquery(inner.to_select(backend), Alias::new(COUNT_ALIAS));
            return count;
        }

        let mut plain = inner;
        plain.distinct = None;
        let mut select = plain.to_select(backend);
        select.clear_selects();
        match distinct {
            Some(columns) => {
                let quoted: Vec<String> = columns
                    .iter()
                    .map(|c| quote_ident(c, backend))
                    .collect();
                select.expr(Expr::cust(format!("COUNT(DISTINCT {})", quoted.join(", "))));
            }
            None => {
                select.expr(Expr::col(Asterisk).count());
            }
        }
        select
    }

    pub fn count_sql(&self, backend: Backend) -> String {
        build(&self.count_statement(backend), backend)
    }

    fn push_selection(&self, select: &mut SelectStatement) {
        if self.selects().is_empty() {
            match (self.target(), self.has_joins()) {
                (Some(target), true) => match target.table_name() {
                    Some(table) => {
                        select.column((Alias::new(table), Asterisk));
                    }
                    None => {
                        select.column(Asterisk);
                    }
                },
                _ => {
                    select.column(Asterisk);
                }
            }
        } else {
            for expr in self.selects() {
                select.expr(Expr::cust(expr.clone()));
            }
        }
    }
}

/// Render a statement for `backend`.
pub(crate) fn build(select: &SelectStatement, backend: Backend) -> String {
    match backend {
        Backend::Postgres => select.to_string(PostgresQueryBuilder),
        Backend::MySql => select.to_string(MysqlQueryBuilder),
        Backend::Sqlite => select.to_string(SqliteQueryBuilder),
    }
}

/// `true` for `name` and `table.name` made of ASCII word characters.
pub fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Column reference: a quoted identifier for plain names, raw SQL otherwise.
pub(crate) fn column_expr(name: &str) -> Expr {
    if !is_plain_identifier(name) {
        return Expr::expr(Expr::cust(name.to_string()));
    }
    match name.split_once('.') {
        Some((table, column)) => Expr::col((Alias::new(table), Alias::new(column))),
        None => Expr::col(Alias::new(name)),
    }
}

fn table_ref(name: &str) -> TableRef {
    match name.split_once('.') {
        Some((schema, table)) => (Alias::new(schema), Alias::new(table)).into_table_ref(),
        None => Alias::new(name).into_table_ref(),
    }
}

fn quote_ident(name: &str, backend: Backend) -> String {
    if !is_plain_identifier(name) {
        return name.to_string();
    }
    let quote = match backend {
        Backend::MySql => '`',
        Backend::Postgres | Backend::Sqlite => '"',
    };
    name.split('.')
        .map(|part| format!("{quote}{part}{quote}"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Convert a JSON value into a bound SQL value.
pub(crate) fn sql_value(value: &Value) -> sea_query::Value {
    match value {
        Value::Null => sea_query::Value::String(None),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.clone().into(),
        Value::Array(_) | Value::Object(_) => value.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Condition, Join, Model, Relation};

    #[test]
    fn plain_table_selects_everything() {
        let sql = TableQuery::table("users").to_sql(Backend::Postgres);
        assert_eq!(sql, r#"SELECT * FROM "users""#);
    }

    #[test]
    fn full_query_renders_all_clauses() {
        let sql = TableQuery::table("users")
            .select("id, name")
            .filter(Condition::gt("age", 20))
            .order_by("age", SortDirection::Desc)
            .limit(10)
            .offset(20)
            .to_sql(Backend::Postgres);

        assert!(sql.starts_with("SELECT id, name FROM \"users\""), "SQL: {sql}");
        assert!(sql.contains(r#"WHERE "age" > 20"#), "SQL: {sql}");
        assert!(sql.contains(r#"ORDER BY "age" DESC"#), "SQL: {sql}");
        assert!(sql.contains("LIMIT 10"), "SQL: {sql}");
        assert!(sql.contains("OFFSET 20"), "SQL: {sql}");
    }

    #[test]
    fn count_drops_pagination_and_order() {
        let sql = TableQuery::table("users")
            .filter(Condition::eq("active", true))
            .order_by("age", SortDirection::Asc)
            .limit(10)
            .offset(5)
            .count_sql(Backend::Postgres);

        assert!(sql.contains("COUNT(*)"), "SQL: {sql}");
        assert!(sql.contains("WHERE"), "SQL: {sql}");
        assert!(!sql.contains("ORDER BY"), "SQL: {sql}");
        assert!(!sql.contains("LIMIT"), "SQL: {sql}");
        assert!(!sql.contains("OFFSET"), "SQL: {sql}");
    }

    #[test]
    fn distinct_columns_count_distinct() {
        let sql = TableQuery::table("users")
            .distinct_on(["id"])
            .count_sql(Backend::Postgres);
        assert!(sql.contains(r#"COUNT(DISTINCT "id")"#), "SQL: {sql}");
        assert!(!sql.contains("SELECT DISTINCT"), "SQL: {sql}");
    }

    #[test]
    fn grouped_count_wraps_query() {
        let sql = TableQuery::table("users")
            .select("age, COUNT(*) AS n")
            .group_by(["age"])
            .count_sql(Backend::Postgres);
        assert!(sql.contains("FROM (SELECT age, COUNT(*) AS n"), "SQL: {sql}");
        assert!(sql.contains(r#"GROUP BY "age") AS "count_table""#), "SQL: {sql}");
    }

    #[test]
    fn union_renders_and_counts_wrapped() {
        let query = TableQuery::table("users")
            .select("name")
            .union_all(TableQuery::table("admins").select("name"));
        let sql = query.to_sql(Backend::Postgres);
        assert!(sql.contains("UNION ALL"), "SQL: {sql}");

        let count = query.count_sql(Backend::Postgres);
        assert!(count.contains(r#"AS "count_table""#), "SQL: {count}");
    }

    #[test]
    fn joins_qualify_star_with_target() {
        let sql = TableQuery::model(
            Model::new("users").relation(Relation::has_many("profiles", "profiles", "user_id")),
        )
        .join(Join::left("profiles", "profiles.user_id", "users.id"))
        .to_sql(Backend::Postgres);

        assert!(sql.starts_with(r#"SELECT "users".* FROM "users""#), "SQL: {sql}");
        assert!(
            sql.contains(r#"LEFT JOIN "profiles" ON "profiles"."user_id" = "users"."id""#),
            "SQL: {sql}"
        );
    }

    #[test]
    fn subquery_target_uses_alias() {
        let inner = TableQuery::table("users").filter(Condition::eq("active", true));
        let sql = TableQuery::subquery(inner, "active_users").to_sql(Backend::Postgres);
        assert!(sql.contains(r#") AS "active_users""#), "SQL: {sql}");
    }

    #[test]
    fn mysql_quotes_with_backticks() {
        let sql = TableQuery::table("users")
            .order_by("name", SortDirection::Asc)
            .to_sql(Backend::MySql);
        assert_eq!(sql, "SELECT * FROM `users` ORDER BY `name` ASC");
    }

    #[test]
    fn identifier_detection() {
        assert!(is_plain_identifier("age"));
        assert!(is_plain_identifier("users.age"));
        assert!(!is_plain_identifier("COUNT(*)"));
        assert!(!is_plain_identifier("a.b.c"));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier(""));
    }

    #[test]
    fn json_values_convert() {
        assert_eq!(sql_value(&serde_json::json!(3)), sea_query::Value::BigInt(Some(3)));
        assert_eq!(
            sql_value(&serde_json::json!("x")),
            sea_query::Value::String(Some(Box::new("x".into())))
        );
    }
}
