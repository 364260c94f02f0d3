//! PostgreSQL execution through sqlx.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{DataSource, resolve_preloads};
use crate::Row;
use crate::error::SourceError;
use crate::query::{Backend, TableQuery};

const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`DataSource`] over a Postgres connection pool.
///
/// Every call runs in its own transaction with `SET LOCAL statement_timeout`,
/// so the timeout resets when the transaction ends.
#[derive(Clone)]
pub struct PgSource {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, SourceError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(tx)
    }
}

fn into_row(value: Value) -> Result<Row, SourceError> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(SourceError::Decode(format!("expected a JSON object, got {other}"))),
    }
}

/// Aggregate the rows of `sql` into one JSON array. Postgres feeds
/// `json_agg` in the order of a sorted subquery, so ORDER BY survives.
fn json_rows_sql(sql: &str) -> String {
    format!("SELECT COALESCE(json_agg(t), '[]'::json) FROM ({sql}) t")
}

async fn fetch_json(
    tx: &mut Transaction<'static, Postgres>,
    sql: &str,
) -> Result<Vec<Row>, SourceError> {
    let value: Value = sqlx::query_scalar(&json_rows_sql(sql))
        .fetch_one(&mut **tx)
        .await?;
    match value {
        Value::Array(values) => values.into_iter().map(into_row).collect(),
        other => Err(SourceError::Decode(format!("expected a JSON array, got {other}"))),
    }
}

#[async_trait]
impl DataSource for PgSource {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn fetch(&self, query: &TableQuery) -> Result<Vec<Row>, SourceError> {
        let preloads = resolve_preloads(query)?;
        let sql = query.to_sql(Backend::Postgres);
        debug!(%sql, "fetching rows");

        let mut tx = self.begin().await?;
        let mut rows = fetch_json(&mut tx, &sql).await?;

        for preload in &preloads {
            let children = match preload.child_query(&rows) {
                Some(child) => fetch_json(&mut tx, &child.to_sql(Backend::Postgres)).await?,
                None => Vec::new(),
            };
            preload.attach(&mut rows, children);
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn count(&self, query: &TableQuery) -> Result<i64, SourceError> {
        let sql = query.count_sql(Backend::Postgres);
        debug!(%sql, "counting rows");

        let mut tx = self.begin().await?;
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn scalar(&self, query: &TableQuery) -> Result<i64, SourceError> {
        let sql = query.to_sql(Backend::Postgres);
        debug!(%sql, "reading scalar");

        let mut tx = self.begin().await?;
        let value: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(value)
    }
}
