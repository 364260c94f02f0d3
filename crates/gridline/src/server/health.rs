//! Health check endpoint.
//!
//! Returns 200 OK if PostgreSQL answers `SELECT 1`, 503 Service Unavailable
//! otherwise.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Serialize, PartialEq)]
struct HealthResponse {
    status: &'static str,
    postgres: bool,
}

fn report(postgres: bool) -> (StatusCode, HealthResponse) {
    if postgres {
        (StatusCode::OK, HealthResponse { status: "healthy", postgres })
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthResponse { status: "unhealthy", postgres },
        )
    }
}

async fn health_check(State(pool): State<PgPool>) -> (StatusCode, Json<HealthResponse>) {
    let postgres = sqlx::query("SELECT 1").execute(&pool).await.is_ok();
    let (status, body) = report(postgres);
    (status, Json(body))
}

/// Create the health check router.
pub fn router(pool: PgPool) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(pool)
}
