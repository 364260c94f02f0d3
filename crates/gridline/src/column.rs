//! Column definitions and the per-table column registry.
//!
//! The registry owns the declared columns, keyed by their `data` binding, the
//! whitelist/blacklist visibility policy, and the optional projection ("only")
//! list. All mutation goes through its methods so the uniqueness and
//! precedence rules stay in one place.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::Row;

/// Render function: sees the whole row, returns the new cell value.
pub type RenderFn = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

/// A column of the table.
#[derive(Clone, Default)]
pub struct Column {
    /// Display name; doubles as the storage column when non-empty.
    pub name: String,

    /// Binding key in each row. Unique within a registry.
    pub data: String,

    pub searchable: bool,
    pub orderable: bool,
    pub render: Option<RenderFn>,
}

impl Column {
    /// A searchable, orderable column with `name == data`.
    pub fn new(data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            name: data.clone(),
            data,
            searchable: true,
            orderable: true,
            render: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn searchable(mut self, searchable: bool) -> Self {
        self.searchable = searchable;
        self
    }

    pub fn orderable(mut self, orderable: bool) -> Self {
        self.orderable = orderable;
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&Row) -> Value + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    /// Column name used in SQL: `name`, falling back to `data`.
    pub fn storage_name(&self) -> &str {
        if self.name.is_empty() {
            &self.data
        } else {
            &self.name
        }
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("searchable", &self.searchable)
            .field("orderable", &self.orderable)
            .field("render", &self.render.is_some())
            .finish()
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.data == other.data
            && self.searchable == other.searchable
            && self.orderable == other.orderable
            && self.render.is_some() == other.render.is_some()
    }
}

/// Registry of declared columns plus the visibility policy.
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
    only: Option<Vec<String>>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a column, or overwrite the definition registered under the
    /// same `data` key in place.
    pub fn add(&mut self, column: Column) {
        match self.index.get(&column.data) {
            Some(&i) => self.columns[i] = column,
            None => {
                self.index.insert(column.data.clone(), self.columns.len());
                self.columns.push(column);
            }
        }
    }

    /// Wrap `transform` around the current cell value of `data`.
    ///
    /// Returns `false` (and changes nothing) when the column is unknown.
    pub fn edit<F>(&mut self, data: &str, transform: F) -> bool
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let Some(&i) = self.index.get(data) else {
            return false;
        };
        let key = self.columns[i].data.clone();
        self.columns[i].render = Some(Arc::new(move |row: &Row| {
            transform(row.get(&key).unwrap_or(&Value::Null))
        }));
        true
    }

    /// Remove columns by `data` key.
    ///
    /// With a projection active, the keys are dropped from it as well. With
    /// none active, the remaining columns become the projection, so removed
    /// keys also leave the output rows.
    pub fn remove<S: AsRef<str>>(&mut self, keys: &[S]) {
        let exclude: HashSet<&str> = keys.iter().map(AsRef::as_ref).collect();

        self.columns.retain(|c| !exclude.contains(c.data.as_str()));
        self.reindex();

        match &mut self.only {
            Some(only) => only.retain(|k| !exclude.contains(k.as_str())),
            None => {
                self.only = Some(self.columns.iter().map(|c| c.data.clone()).collect());
            }
        }
    }

    /// Add keys to the whitelist.
    pub fn whitelist<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist.extend(keys.into_iter().map(Into::into));
    }

    /// Add keys to the blacklist.
    pub fn blacklist<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist.extend(keys.into_iter().map(Into::into));
    }

    /// Replace the projection list.
    pub fn set_only<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(keys.into_iter().map(Into::into).collect());
    }

    /// Visibility policy: a non-empty whitelist wins; otherwise anything not
    /// blacklisted is allowed.
    pub fn is_allowed(&self, key: &str) -> bool {
        if !self.whitelist.is_empty() {
            return self.whitelist.contains(key);
        }
        !self.blacklist.contains(key)
    }

    /// Registered columns that pass the visibility policy and, when a
    /// projection is active, appear in it. Registry order is kept.
    pub fn filtered(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| self.is_allowed(&c.data))
            .filter(|c| {
                self.only
                    .as_ref()
                    .is_none_or(|only| only.iter().any(|k| *k == c.data))
            })
            .collect()
    }

    pub fn get(&self, data: &str) -> Option<&Column> {
        self.index.get(data).map(|&i| &self.columns[i])
    }

    pub fn contains(&self, data: &str) -> bool {
        self.index.contains_key(data)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The projection list, if one is active.
    pub fn only(&self) -> Option<&[String]> {
        self.only.as_deref()
    }

    pub fn whitelisted(&self) -> &HashSet<String> {
        &self.whitelist
    }

    pub fn blacklisted(&self) -> &HashSet<String> {
        &self.blacklist
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn reindex(&mut self) {
        self.index = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.data.clone(), i))
            .collect();
    }
}
