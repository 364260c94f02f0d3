//! Gridline test utilities.
//!
//! Helpers for integration testing: row fixtures, a DataTables parameter
//! builder, and assertion utilities for rendered SQL and response JSON.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue, json};

/// Teams assigned round-robin by [`people`].
pub const TEAMS: [&str; 3] = ["red", "blue", "green"];

/// Create a test person with default values.
pub fn test_person(id: i64, name: &str) -> TestPerson {
    TestPerson {
        id,
        name: name.to_string(),
        age: 30,
        team: TEAMS[0].to_string(),
        email: None,
    }
}

/// `n` people with ids `1..=n`.
///
/// Even indexes are named `John Smith {i}`, odd ones `Mary Jones {i}`, so a
/// search for "john" matches exactly half. Ages cycle through 20, 30, 40 and
/// 50; teams through [`TEAMS`].
pub fn people(n: usize) -> Vec<Map<String, JsonValue>> {
    (0..n)
        .map(|i| {
            let id = i as i64 + 1;
            let name = if i % 2 == 0 {
                format!("John Smith {i}")
            } else {
                format!("Mary Jones {i}")
            };
            test_person(id, &name)
                .with_age(20 + (i as i64 % 4) * 10)
                .with_team(TEAMS[i % TEAMS.len()])
                .into_row()
        })
        .collect()
}

/// A test person builder for creating fixture rows.
#[derive(Debug, Clone)]
pub struct TestPerson {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub team: String,
    pub email: Option<String>,
}

impl TestPerson {
    /// Set the age.
    pub fn with_age(mut self, age: i64) -> Self {
        self.age = age;
        self
    }

    /// Set the team.
    pub fn with_team(mut self, team: &str) -> Self {
        self.team = team.to_string();
        self
    }

    /// Set an email address.
    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Convert into a row. A missing email is stored as `null`.
    pub fn into_row(self) -> Map<String, JsonValue> {
        let mut row = Map::new();
        row.insert("id".into(), json!(self.id));
        row.insert("name".into(), json!(self.name));
        row.insert("age".into(), json!(self.age));
        row.insert("team".into(), json!(self.team));
        row.insert("email".into(), json!(self.email));
        row
    }
}

/// Posts owned by `people(n)`: `per_person` posts each, `user_id` pointing
/// at the owner.
pub fn posts(n: usize, per_person: usize) -> Vec<Map<String, JsonValue>> {
    let mut rows = Vec::with_capacity(n * per_person);
    for owner in 1..=n {
        for k in 0..per_person {
            let id = rows.len() as i64 + 1;
            let mut row = Map::new();
            row.insert("id".into(), json!(id));
            row.insert("user_id".into(), json!(owner as i64));
            row.insert("title".into(), json!(format!("Post {k} by {owner}")));
            rows.push(row);
        }
    }
    rows
}

/// One client column of a [`DtParams`] request.
#[derive(Debug, Clone)]
pub struct DtColumn {
    pub data: String,
    pub name: String,
    pub searchable: bool,
    pub orderable: bool,
    pub search: String,
    pub regex: bool,
}

/// Builder for DataTables form parameters, as sent by the browser.
#[derive(Debug, Clone)]
pub struct DtParams {
    pub draw: i64,
    pub start: i64,
    pub length: i64,
    pub search: String,
    pub regex: bool,
    pub columns: Vec<DtColumn>,
    pub order: Vec<(usize, String)>,
}

impl DtParams {
    /// A first-page request of ten rows with no columns.
    pub fn new(draw: i64) -> Self {
        Self {
            draw,
            start: 0,
            length: 10,
            search: String::new(),
            regex: false,
            columns: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Set the pagination window.
    pub fn page(mut self, start: i64, length: i64) -> Self {
        self.start = start;
        self.length = length;
        self
    }

    /// Set a plain global search.
    pub fn search(mut self, value: &str) -> Self {
        self.search = value.to_string();
        self.regex = false;
        self
    }

    /// Set a regular-expression global search.
    pub fn regex_search(mut self, pattern: &str) -> Self {
        self.search = pattern.to_string();
        self.regex = true;
        self
    }

    /// Add a searchable, orderable column.
    pub fn column(self, data: &str) -> Self {
        self.column_with(data, true, true)
    }

    /// Add a column with explicit flags.
    pub fn column_with(mut self, data: &str, searchable: bool, orderable: bool) -> Self {
        self.columns.push(DtColumn {
            data: data.to_string(),
            name: String::new(),
            searchable,
            orderable,
            search: String::new(),
            regex: false,
        });
        self
    }

    /// Set the `name` of the column at `index`. Out-of-range indexes are
    /// ignored.
    pub fn column_name(mut self, index: usize, name: &str) -> Self {
        if let Some(column) = self.columns.get_mut(index) {
            column.name = name.to_string();
        }
        self
    }

    /// Set the search value of the column at `index`. Out-of-range indexes
    /// are ignored.
    pub fn column_search(mut self, index: usize, value: &str) -> Self {
        if let Some(column) = self.columns.get_mut(index) {
            column.search = value.to_string();
        }
        self
    }

    /// Add an order entry.
    pub fn order(mut self, column: usize, dir: &str) -> Self {
        self.order.push((column, dir.to_string()));
        self
    }

    /// The flat `(key, value)` pairs.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("draw".to_string(), self.draw.to_string()),
            ("start".to_string(), self.start.to_string()),
            ("length".to_string(), self.length.to_string()),
            ("search[value]".to_string(), self.search.clone()),
            ("search[regex]".to_string(), self.regex.to_string()),
        ];
        for (i, column) in self.columns.iter().enumerate() {
            pairs.push((format!("columns[{i}][data]"), column.data.clone()));
            pairs.push((format!("columns[{i}][name]"), column.name.clone()));
            pairs.push((format!("columns[{i}][searchable]"), column.searchable.to_string()));
            pairs.push((format!("columns[{i}][orderable]"), column.orderable.to_string()));
            pairs.push((format!("columns[{i}][search][value]"), column.search.clone()));
            pairs.push((format!("columns[{i}][search][regex]"), column.regex.to_string()));
        }
        for (i, (column, dir)) in self.order.iter().enumerate() {
            pairs.push((format!("order[{i}][column]"), column.to_string()));
            pairs.push((format!("order[{i}][dir]"), dir.clone()));
        }
        pairs
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.pairs().into_iter().collect()
    }

    /// URL-encoded form, usable as a query string or a form body.
    pub fn encode(&self) -> String {
        self.pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Assertion helpers for rendered SQL and response JSON.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert the `id` of each row in a response `data` array.
    pub fn ids(data: &Value, expected: &[i64]) {
        let actual: Vec<i64> = data
            .as_array()
            .map(|rows| rows.iter().filter_map(|r| r["id"].as_i64()).collect())
            .unwrap_or_default();
        assert_eq!(actual, expected, "row ids mismatch in {data}");
    }
}
