//! The [`DataTable`] builder.
//!
//! A `DataTable` is configured once per request with consuming builder
//! calls, then run against a [`DataSource`] with [`DataTable::make`] (full
//! response) or [`DataTable::raw`] (rows only).
//!
//! ```ignore
//! let response = DataTable::new(TableQuery::table("users"))
//!     .request(request)
//!     .with_number()
//!     .edit_column("name", |v| json!(v.as_str().unwrap_or_default().to_uppercase()))
//!     .make(&source)
//!     .await?;
//! ```

use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::Row;
use crate::column::{Column, ColumnRegistry};
use crate::config::Config;
use crate::error::{DataTableError, Result};
use crate::query::{Model, TableQuery, is_plain_identifier};
use crate::request::{Request, SortDirection};
use crate::response::{
    CustomColumnFn, NUMBER_COLUMN, Response, RowAttributes, RowDataFn, RowDecorator, RowIdFn,
};
use crate::source::DataSource;

/// Caller-supplied query hook, applied to the base query in registration order.
pub type FilterFn = Arc<dyn Fn(TableQuery) -> TableQuery + Send + Sync>;

/// A record count that is either still to be computed or supplied up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordCount {
    #[default]
    Pending,
    /// Trusted as-is; the matching count query is never issued.
    Cached(i64),
}

/// Server-side processing for one DataTables request.
#[derive(Clone, Default)]
pub struct DataTable {
    pub(crate) source: Option<TableQuery>,
    pub(crate) model: Option<Model>,
    pub(crate) request: Request,
    pub(crate) config: Config,
    pub(crate) columns: ColumnRegistry,
    pub(crate) relations: Vec<String>,
    pub(crate) filters: Vec<FilterFn>,
    pub(crate) custom_columns: Vec<CustomColumnFn>,
    pub(crate) attributes: RowAttributes,
    pub(crate) extra: Map<String, Value>,
    pub(crate) total: RecordCount,
    pub(crate) filtered: RecordCount,
}

impl DataTable {
    /// A table over `source`, with search, ordering and pagination enabled.
    pub fn new(source: TableQuery) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// A table with no source query; a [`model`](Self::model) must be bound
    /// before it can run.
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Bind a structured model. Takes precedence over the source target.
    pub fn model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    /// Attach the client request and register its columns.
    ///
    /// Columns that are already registered keep their definition, so flags
    /// and renders declared on the server are not overridden by the client.
    /// Unknown client columns are only registered when their storage name is
    /// a plain identifier; anything else never reaches the SQL.
    pub fn request(mut self, request: Request) -> Self {
        for column in &request.columns {
            if self.columns.contains(&column.data) {
                continue;
            }
            let storage = if column.name.is_empty() { &column.data } else { &column.name };
            if !is_plain_identifier(storage) {
                debug!(column = %storage, "ignoring client column that is not a plain identifier");
                continue;
            }
            self.columns.add(
                Column::new(column.data.clone())
                    .name(column.name.clone())
                    .searchable(column.searchable)
                    .orderable(column.orderable),
            );
        }
        self.request = request;
        self
    }

    /// Restrict output rows to these keys.
    pub fn only<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.set_only(keys);
        self
    }

    /// Preload relations declared on the model.
    pub fn with<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.extend(relations.into_iter().map(Into::into));
        self
    }

    /// Extra top-level response field.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Number rows `start + 1, start + 2, ...` in a `no` column.
    pub fn with_number(mut self) -> Self {
        self.columns.add(
            Column::new(NUMBER_COLUMN)
                .name("No")
                .searchable(false)
                .orderable(false),
        );
        self.columns.blacklist([NUMBER_COLUMN]);
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(TableQuery) -> TableQuery + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.columns.add(column);
        self
    }

    pub fn add_columns<I: IntoIterator<Item = Column>>(mut self, columns: I) -> Self {
        for column in columns {
            self.columns.add(column);
        }
        self
    }

    /// Transform the value of an existing column. Unknown columns are ignored.
    pub fn edit_column<F>(mut self, data: &str, transform: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.columns.edit(data, transform);
        self
    }

    pub fn remove_column<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.columns.remove(keys);
        self
    }

    pub fn whitelist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.whitelist(keys);
        self
    }

    pub fn blacklist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.blacklist(keys);
        self
    }

    /// Row transform applied after the column renders, in registration order.
    pub fn add_custom_column<F>(mut self, editor: F) -> Self
    where
        F: Fn(Row) -> Row + Send + Sync + 'static,
    {
        self.custom_columns.push(Arc::new(editor));
        self
    }

    pub fn set_total_records(mut self, count: i64) -> Self {
        self.total = RecordCount::Cached(count);
        self
    }

    pub fn set_filtered_records(mut self, count: i64) -> Self {
        self.filtered = RecordCount::Cached(count);
        self
    }

    /// Set `DT_RowId`, `DT_RowClass` and `DT_RowData_*` in one call.
    pub fn set_row_attributes<I, D>(self, id: I, class: impl Into<String>, data: D) -> Self
    where
        I: Fn(&Row) -> String + Send + Sync + 'static,
        D: Fn(&Row) -> Row + Send + Sync + 'static,
    {
        self.row_id(id).row_class(class).row_data(data)
    }

    pub fn row_id<F>(mut self, id: F) -> Self
    where
        F: Fn(&Row) -> String + Send + Sync + 'static,
    {
        self.attributes.id = Some(Arc::new(id) as RowIdFn);
        self
    }

    pub fn row_class(mut self, class: impl Into<String>) -> Self {
        self.attributes.class = Some(class.into());
        self
    }

    pub fn row_data<F>(mut self, data: F) -> Self
    where
        F: Fn(&Row) -> Row + Send + Sync + 'static,
    {
        self.attributes.data = Some(Arc::new(data) as RowDataFn);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn disable_search(mut self) -> Self {
        self.config.searchable = false;
        self
    }

    pub fn disable_order(mut self) -> Self {
        self.config.orderable = false;
        self
    }

    pub fn disable_pagination(mut self) -> Self {
        self.config.paginate = false;
        self
    }

    /// Alias of [`disable_pagination`](Self::disable_pagination).
    pub fn skip_paging(self) -> Self {
        self.disable_pagination()
    }

    pub fn case_insensitive(mut self) -> Self {
        self.config.case_insensitive = true;
        self
    }

    /// Sort used when the request carries no order entries. Entries keep
    /// their insertion order.
    pub fn default_sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.config.default_sort.push((column.into(), direction));
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.config.having.push(condition.into());
        self
    }

    pub fn columns(&self) -> &ColumnRegistry {
        &self.columns
    }

    pub fn current_config(&self) -> &Config {
        &self.config
    }

    pub fn current_request(&self) -> &Request {
        &self.request
    }

    /// Check the configuration before any query runs.
    pub fn validate(&self) -> Result<()> {
        if self.model.is_none() {
            let Some(source) = &self.source else {
                return Err(DataTableError::NoSource);
            };
            if source.target().is_none() {
                return Err(DataTableError::MissingModel);
            }
        }

        if self.request.draw == 0 && self.request.columns.is_empty() {
            return Err(DataTableError::InvalidRequest);
        }

        let searches = std::iter::once(&self.request.search)
            .chain(self.request.columns.iter().map(|c| &c.search));
        for search in searches {
            if search.regex && !search.is_empty() {
                Regex::new(&search.value).map_err(DataTableError::InvalidRegex)?;
            }
        }
        Ok(())
    }

    /// Run the table and assemble the full response.
    pub async fn make<S: DataSource + ?Sized>(&self, source: &S) -> Result<Response> {
        self.validate()?;
        let (rows, total, filtered, config) = self.process(source).await?;
        debug!(rows = rows.len(), total, filtered, "assembling response");

        let decorator = RowDecorator::new(
            &self.columns,
            &self.custom_columns,
            &self.attributes,
            self.request.start,
            config.response_format,
        );
        Ok(Response {
            draw: self.request.draw,
            records_total: total,
            records_filtered: filtered,
            data: decorator.finish(rows),
            extra: self.extra.clone(),
        })
    }

    /// Run the table and return the fetched rows without decoration.
    pub async fn raw<S: DataSource + ?Sized>(&self, source: &S) -> Result<Vec<Row>> {
        self.validate()?;
        let (rows, ..) = self.process(source).await?;
        Ok(rows)
    }
}
