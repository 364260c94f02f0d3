//! Error types for table processing and data-source execution.

use thiserror::Error;

/// Errors raised while validating or processing a [`DataTable`](crate::DataTable).
///
/// Configuration errors are reported before any query runs. Execution errors
/// come from the data source and are wrapped transparently so callers can
/// still tell a connectivity or SQL failure apart from a bad setup.
#[derive(Debug, Error)]
pub enum DataTableError {
    #[error("no data source or model provided")]
    NoSource,

    #[error("model is required")]
    MissingModel,

    #[error("invalid request")]
    InvalidRequest,

    #[error("invalid regex search pattern: {0}")]
    InvalidRegex(#[source] regex::Error),

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl DataTableError {
    /// Whether this error came from executing a query rather than from
    /// validating the table configuration.
    pub fn is_execution(&self) -> bool {
        matches!(self, DataTableError::Source(_))
    }
}

/// Errors surfaced by a [`DataSource`](crate::source::DataSource).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    #[error("unsupported query feature: {0}")]
    Unsupported(String),

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("injected failure for {0}")]
    Injected(&'static str),
}

/// Result alias for table processing.
pub type Result<T> = std::result::Result<T, DataTableError>;
