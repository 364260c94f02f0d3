//! HTTP endpoint serving DataTables requests for allow-listed tables.
//!
//! `GET /api/tables/{table}` reads the DataTables parameters from the query
//! string, `POST /api/tables/{table}` from a form body. Both answer with the
//! response JSON.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::DataTableError;
use crate::query::{TableQuery, is_plain_identifier};
use crate::request::{Request, RequestError};
use crate::response::Response;
use crate::source::DataSource;
use crate::table::DataTable;

/// Shared state of the table routes.
#[derive(Clone)]
pub struct ApiState {
    source: Arc<dyn DataSource>,
    tables: Arc<HashSet<String>>,
    config: Arc<Config>,
}

impl ApiState {
    /// Serve `tables` from `source` with the default [`Config`].
    pub fn new<I, S>(source: Arc<dyn DataSource>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            tables: Arc::new(tables.into_iter().map(Into::into).collect()),
            config: Arc::new(Config::default()),
        }
    }

    /// Config applied to every table served.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Whether `table` may be served: allow-listed and a plain identifier.
    pub fn is_exposed(&self, table: &str) -> bool {
        is_plain_identifier(table) && self.tables.contains(table)
    }

    async fn run(&self, table: &str, params: &HashMap<String, String>) -> Result<Response, AppError> {
        if !self.is_exposed(table) {
            return Err(AppError::UnknownTable(table.to_string()));
        }
        let request = Request::from_params(params)?;
        debug!(table, draw = request.draw, "processing table request");

        let response = DataTable::new(TableQuery::table(table))
            .config(self.config.as_ref().clone())
            .request(request)
            .make(self.source.as_ref())
            .await?;
        Ok(response)
    }
}

/// Errors returned by the table routes.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Table(#[from] DataTableError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::UnknownTable(_) => StatusCode::NOT_FOUND,
            AppError::Request(_) => StatusCode::BAD_REQUEST,
            AppError::Table(e) if e.is_execution() => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Table(_) => StatusCode::BAD_REQUEST,
        };

        // Execution failures are logged, never echoed.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "table query failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn table_query(
    State(state): State<ApiState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Response>, AppError> {
    state.run(&table, &params).await.map(Json)
}

async fn table_form(
    State(state): State<ApiState>,
    Path(table): Path<String>,
    Form(params): Form<HashMap<String, String>>,
) -> Result<Json<Response>, AppError> {
    state.run(&table, &params).await.map(Json)
}

/// Create the table router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/tables/{table}", get(table_query).post(table_form))
        .with_state(state)
}
