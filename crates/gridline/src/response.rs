//! Response payload and per-row decoration.

use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

use crate::Row;
use crate::column::{ColumnRegistry, RenderFn};
use crate::config::ResponseFormat;

pub const ROW_ID: &str = "DT_RowId";
pub const ROW_CLASS: &str = "DT_RowClass";
pub const ROW_DATA_PREFIX: &str = "DT_RowData_";

/// Key of the row-number column registered by `with_number`.
pub const NUMBER_COLUMN: &str = "no";

/// Row to row transform applied after column renders.
pub type CustomColumnFn = Arc<dyn Fn(Row) -> Row + Send + Sync>;
pub type RowIdFn = Arc<dyn Fn(&Row) -> String + Send + Sync>;
/// Row to extra `DT_RowData_*` entries.
pub type RowDataFn = Arc<dyn Fn(&Row) -> Row + Send + Sync>;

/// Row-level DataTables attributes.
#[derive(Clone, Default)]
pub struct RowAttributes {
    pub id: Option<RowIdFn>,
    pub class: Option<String>,
    pub data: Option<RowDataFn>,
}

impl RowAttributes {
    fn is_empty(&self) -> bool {
        self.id.is_none() && self.class.is_none() && self.data.is_none()
    }
}

/// The DataTables server-side response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub draw: i64,
    pub records_total: i64,
    pub records_filtered: i64,
    pub data: Vec<Value>,
    /// Extra top-level fields, merged after the reserved ones.
    pub extra: Map<String, Value>,
}

impl Response {
    /// Flatten into the wire map. Extras are inserted last and unconditionally.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("draw".into(), self.draw.into());
        map.insert("recordsTotal".into(), self.records_total.into());
        map.insert("recordsFiltered".into(), self.records_filtered.into());
        map.insert("data".into(), Value::Array(self.data.clone()));
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

/// Applies numbering, renders, custom columns and row attributes to each
/// row, then projects the result.
pub struct RowDecorator<'a> {
    number: Option<i64>,
    renders: Vec<(&'a str, &'a RenderFn)>,
    custom: &'a [CustomColumnFn],
    attributes: &'a RowAttributes,
    projection: Option<&'a [String]>,
    format: ResponseFormat,
    visible: Vec<&'a str>,
}

impl<'a> RowDecorator<'a> {
    pub fn new(
        registry: &'a ColumnRegistry,
        custom: &'a [CustomColumnFn],
        attributes: &'a RowAttributes,
        start: i64,
        format: ResponseFormat,
    ) -> Self {
        Self {
            number: registry.contains(NUMBER_COLUMN).then_some(start.max(0)),
            renders: registry
                .columns()
                .iter()
                .filter_map(|c| c.render.as_ref().map(|r| (c.data.as_str(), r)))
                .collect(),
            custom,
            attributes,
            projection: registry.only(),
            format,
            visible: registry.filtered().into_iter().map(|c| c.data.as_str()).collect(),
        }
    }

    /// Decorate `rows` in place and convert them to response values.
    ///
    /// Each row is owned by one worker for the whole decoration, so the
    /// output matches a sequential pass.
    pub fn finish(&self, mut rows: Vec<Row>) -> Vec<Value> {
        match render_pool() {
            Some(pool) => pool.install(|| {
                rows.par_iter_mut()
                    .enumerate()
                    .for_each(|(i, row)| self.decorate(i, row));
            }),
            None => {
                for (i, row) in rows.iter_mut().enumerate() {
                    self.decorate(i, row);
                }
            }
        }
        rows.into_iter().map(|row| self.shape(row)).collect()
    }

    /// Numbering, renders, custom columns and attributes for one row.
    pub fn decorate(&self, index: usize, row: &mut Row) {
        if let Some(start) = self.number {
            let index = i64::try_from(index).unwrap_or(i64::MAX);
            row.insert(NUMBER_COLUMN.into(), Value::from(start + index + 1));
        }

        for (key, render) in &self.renders {
            let value = render(&*row);
            row.insert((*key).to_string(), value);
        }

        for editor in self.custom {
            let taken = std::mem::take(row);
            *row = editor(taken);
        }

        if self.attributes.is_empty() {
            return;
        }
        if let Some(id) = &self.attributes.id {
            let id = id(&*row);
            row.insert(ROW_ID.into(), Value::String(id));
        }
        if let Some(class) = &self.attributes.class {
            row.insert(ROW_CLASS.into(), Value::String(class.clone()));
        }
        if let Some(data) = &self.attributes.data {
            for (key, value) in data(&*row) {
                row.insert(format!("{ROW_DATA_PREFIX}{key}"), value);
            }
        }
    }

    /// Apply the projection and the response format.
    fn shape(&self, mut row: Row) -> Value {
        if let Some(only) = self.projection {
            // Row attributes are not columns and survive the projection.
            row.retain(|key, _| only.contains(key) || key.starts_with("DT_Row"));
        }
        match self.format {
            ResponseFormat::Objects => Value::Object(row),
            ResponseFormat::Arrays => Value::Array(
                self.visible
                    .iter()
                    .map(|key| row.get(*key).cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }
}

/// Process-wide pool for row decoration, sized to twice the available
/// parallelism. `None` when the pool could not be started.
fn render_pool() -> Option<&'static ThreadPool> {
    static POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();
    POOL.get_or_init(|| {
        let threads = std::thread::available_parallelism().map_or(1, NonZeroUsize::get) * 2;
        match ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("gridline-render-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "failed to start render pool, decorating rows sequentially");
                None
            }
        }
    })
    .as_ref()
}
