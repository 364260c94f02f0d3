//! DataTables request model and form-parameter ingestion.
//!
//! A [`Request`] carries the draw counter, the pagination window, the global
//! search, the order directives and one [`ColumnRequest`] per client column.
//! It can be deserialized from a JSON body or parsed from the flat form
//! encoding DataTables sends (`columns[0][data]=id&order[0][dir]=asc...`).

use std::collections::HashMap;
use std::fmt;
use std::num::ParseIntError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Search criteria, either global or attached to a single column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Search {
    #[serde(default)]
    pub value: String,

    /// Treat `value` as a regular expression.
    #[serde(default)]
    pub regex: bool,
}

impl Search {
    /// Plain substring search.
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            regex: false,
        }
    }

    /// Regular-expression search.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            value: pattern.into(),
            regex: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// One order directive: an index into [`Request::columns`] and a direction
/// token as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub column: usize,

    #[serde(default)]
    pub dir: String,
}

impl Order {
    pub fn new(column: usize, dir: impl Into<String>) -> Self {
        Self {
            column,
            dir: dir.into(),
        }
    }

    /// Direction normalized with [`SortDirection::parse_lenient`].
    pub fn direction(&self) -> SortDirection {
        SortDirection::parse_lenient(&self.dir)
    }
}

/// Client-side description of a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRequest {
    #[serde(default)]
    pub data: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub searchable: bool,

    #[serde(default)]
    pub orderable: bool,

    #[serde(default)]
    pub search: Search,
}

impl ColumnRequest {
    /// A searchable, orderable column bound to `data`.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            searchable: true,
            orderable: true,
            ..Default::default()
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

    pub fn search(mut self, search: Search) -> Self {
        self.search = search;
        self
    }
}

/// A DataTables server-side processing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Echo token; returned unchanged in the response.
    #[serde(default)]
    pub draw: i64,

    /// Offset of the first row to return.
    #[serde(default)]
    pub start: i64,

    /// Page size. Negative means "no limit".
    #[serde(default)]
    pub length: i64,

    #[serde(default)]
    pub search: Search,

    #[serde(default)]
    pub order: Vec<Order>,

    #[serde(default)]
    pub columns: Vec<ColumnRequest>,
}

impl Request {
    /// Parse a request from DataTables form parameters.
    ///
    /// `draw` and `start` must be integers and `search[regex]` must be a
    /// boolean literal. `length` falls back to 0 when missing or malformed.
    /// Columns are read until the first index without `columns[i][data]`,
    /// and order entries until the first index without `order[i][column]`;
    /// order entries pointing at a missing or non-orderable column are
    /// dropped. When nothing survives and the first column is orderable,
    /// the request is ordered by that column ascending.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, RequestError> {
        let get = |key: &str| param(params, key);

        let draw = parse_int("draw", get("draw"))?;
        let start = parse_int("start", get("start"))?;
        let length = get("length").trim().parse().unwrap_or(0);
        let search = Search {
            value: get("search[value]").to_string(),
            regex: parse_bool("search[regex]", get("search[regex]"))?,
        };

        let mut columns = Vec::new();
        loop {
            let i = columns.len();
            let data = get(&format!("columns[{i}][data]"));
            if data.is_empty() {
                break;
            }
            columns.push(ColumnRequest {
                data: data.to_string(),
                name: get(&format!("columns[{i}][name]")).to_string(),
                searchable: get(&format!("columns[{i}][searchable]")) == "true",
                orderable: get(&format!("columns[{i}][orderable]")) == "true",
                search: Search {
                    value: get(&format!("columns[{i}][search][value]")).to_string(),
                    regex: get(&format!("columns[{i}][search][regex]")) == "true",
                },
            });
        }

        let mut order = Vec::new();
        for i in 0.. {
            let column = get(&format!("order[{i}][column]"));
            if column.is_empty() {
                break;
            }
            let Ok(column) = column.trim().parse::<usize>() else {
                continue;
            };
            if columns.get(column).is_some_and(|c| c.orderable) {
                order.push(Order::new(column, get(&format!("order[{i}][dir]"))));
            }
        }

        if order.is_empty() && columns.first().is_some_and(|c| c.orderable) {
            order.push(Order::new(0, "asc"));
        }

        Ok(Self {
            draw,
            start,
            length,
            search,
            order,
            columns,
        })
    }

    /// Parse a request from `(key, value)` pairs, later pairs winning.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, RequestError>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let params: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_params(&params)
    }
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or_default()
}

fn parse_int(field: &'static str, value: &str) -> Result<i64, RequestError> {
    value
        .trim()
        .parse()
        .map_err(|source| RequestError::InvalidNumber { field, source })
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, RequestError> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(RequestError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

/// Request ingestion failures.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid value for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid value for {field}: {value:?} is not a boolean")]
    InvalidBool { field: &'static str, value: String },
}

/// Canonical sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Normalize a client token. Anything other than a case-insensitive
    /// `desc` sorts ascending.
    pub fn parse_lenient(token: &str) -> Self {
        if token.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}
