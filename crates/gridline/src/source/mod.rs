//! Query execution backends.
//!
//! A [`DataSource`] executes [`TableQuery`] values: it materialises rows,
//! runs counts and renders the dry-run SQL used for shape detection.

pub mod memory;
pub mod postgres;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;

use crate::Row;
use crate::error::SourceError;
use crate::query::{Backend, Condition, Relation, TableQuery};

/// Executes queries built by the table pipeline.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// SQL dialect queries are rendered in.
    fn backend(&self) -> Backend;

    /// Render `query` without executing it.
    fn dry_run(&self, query: &TableQuery) -> String {
        query.to_sql(self.backend())
    }

    /// Run `query` and return its rows in order, with requested relations
    /// attached under their names.
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<Row>, SourceError>;

    /// Count the rows `query` would return (see [`TableQuery::count_sql`]).
    async fn count(&self, query: &TableQuery) -> Result<i64, SourceError>;

    /// Run `query` as written and read the first column of the first row.
    async fn scalar(&self, query: &TableQuery) -> Result<i64, SourceError>;
}

/// A relation resolved against the query's model.
pub(crate) struct Preload<'a> {
    pub relation: &'a Relation,
    pub local_key: &'a str,
}

/// Resolve the preloads requested on `query`.
pub(crate) fn resolve_preloads(query: &TableQuery) -> Result<Vec<Preload<'_>>, SourceError> {
    if query.preloads().is_empty() {
        return Ok(Vec::new());
    }
    let Some(model) = query.bound_model() else {
        return Err(SourceError::UnknownRelation(query.preloads().join(", ")));
    };

    query
        .preloads()
        .iter()
        .map(|name| {
            let relation = model
                .find_relation(name)
                .ok_or_else(|| SourceError::UnknownRelation(name.clone()))?;
            Ok(Preload {
                relation,
                local_key: relation.local_key.as_deref().unwrap_or(model.key()),
            })
        })
        .collect()
}

impl Preload<'_> {
    /// Child query selecting every row that points at one of `parents`, or
    /// `None` when no parent carries a key.
    pub fn child_query(&self, parents: &[Row]) -> Option<TableQuery> {
        let mut seen = HashSet::new();
        let keys: Vec<Value> = parents
            .iter()
            .filter_map(|row| row.get(self.local_key))
            .filter(|v| !v.is_null())
            .filter(|v| seen.insert(v.to_string()))
            .cloned()
            .collect();

        if keys.is_empty() {
            return None;
        }

        Some(
            TableQuery::table(self.relation.table.clone())
                .filter(Condition::is_in(self.relation.foreign_key.clone(), keys)),
        )
    }

    /// Attach `children` to their parents under the relation name. Parents
    /// without children get an empty array.
    pub fn attach(&self, parents: &mut [Row], children: Vec<Row>) {
        let mut by_parent: HashMap<String, Vec<Value>> = HashMap::new();
        for child in children {
            if let Some(key) = child.get(&self.relation.foreign_key) {
                by_parent
                    .entry(key.to_string())
                    .or_default()
                    .push(Value::Object(child));
            }
        }

        for parent in parents.iter_mut() {
            let children = parent
                .get(self.local_key)
                .and_then(|key| by_parent.get(&key.to_string()))
                .cloned()
                .unwrap_or_default();
            parent.insert(self.relation.name.clone(), Value::Array(children));
        }
    }
}
