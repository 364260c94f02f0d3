//! Gridline: server-side processing for DataTables grids.
//!
//! A [`DataTable`] turns a DataTables [`Request`] plus a declarative column
//! model into base, count, filtered and paged queries against a
//! [`DataSource`], then assembles the `{draw, recordsTotal, recordsFiltered,
//! data}` payload. The `gridline-server` binary exposes it over HTTP.

pub mod column;
pub mod config;
pub mod detect;
pub mod error;
pub mod http;
pub mod query;
pub mod request;
pub mod response;
pub mod source;
pub mod table;

mod pipeline;

/// A result row: column name to JSON value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub use column::{Column, ColumnRegistry};
pub use config::{Config, ResponseFormat, ShapeDetection};
pub use error::{DataTableError, Result, SourceError};
pub use query::{Backend, Condition, Join, Model, Relation, TableQuery};
pub use request::{ColumnRequest, Order, Request, RequestError, Search, SortDirection};
pub use response::Response;
pub use source::DataSource;
pub use source::memory::MemorySource;
pub use source::postgres::PgSource;
pub use table::{DataTable, RecordCount};
