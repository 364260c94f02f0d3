//! Per-table feature toggles and SQL shape flags.

use serde::{Deserialize, Serialize};

use crate::request::SortDirection;

/// Configuration of a single [`DataTable`](crate::DataTable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Apply the global search.
    pub searchable: bool,

    /// Apply request ordering (or the default sort).
    pub orderable: bool,

    /// Apply `start`/`length` as OFFSET/LIMIT.
    pub paginate: bool,

    /// Apply per-column search values.
    pub column_search: bool,

    /// Fold case on both sides of LIKE/regex comparisons.
    pub case_insensitive: bool,

    /// Base query is a UNION; ordering switches to `union_order`.
    pub union: bool,

    /// Base query selects DISTINCT; counts become `COUNT(DISTINCT pk)`.
    pub distinct: bool,

    /// GROUP BY expressions. Non-empty forces count-of-groups filtering.
    pub group_by: Vec<String>,

    /// HAVING conditions, AND-combined.
    pub having: Vec<String>,

    /// Sort applied when the request carries no order entries.
    pub default_sort: Vec<(String, SortDirection)>,

    /// How detected SQL shape combines with the flags above.
    pub shape_detection: ShapeDetection,

    pub response_format: ResponseFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            searchable: true,
            orderable: true,
            paginate: true,
            column_search: true,
            case_insensitive: false,
            union: false,
            distinct: false,
            group_by: Vec::new(),
            having: Vec::new(),
            default_sort: Vec::new(),
            shape_detection: ShapeDetection::default(),
            response_format: ResponseFormat::default(),
        }
    }
}

/// Policy for folding detected clause shapes into [`Config`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeDetection {
    /// Detected values replace the declared ones.
    #[default]
    Authoritative,
    /// Detected values only fill flags and lists left unset.
    Fallback,
    /// Never inspect the base query.
    Off,
}

/// Shape of each row in the response `data` array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// One JSON object per row.
    #[default]
    Objects,
    /// One JSON array per row, ordered like the visible columns.
    Arrays,
}
