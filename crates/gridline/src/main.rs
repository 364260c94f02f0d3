//! Gridline server
//!
//! Serves DataTables server-side requests for allow-listed PostgreSQL tables.

mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::{HeaderValue, Method};
use gridline::http::{self, ApiState};
use gridline::{Config, PgSource};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::server::config::ServerConfig;
use crate::server::health;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting gridline server");

    let config = ServerConfig::from_env().context("failed to load configuration")?;
    info!(port = config.port, tables = ?config.tables, "Configuration loaded");
    if config.tables.is_empty() {
        warn!("GRIDLINE_TABLES is empty, no table will be served");
    }

    let pool = config
        .connect()
        .await
        .context("failed to initialize database pool")?;
    info!("Database connection established");

    let source = PgSource::new(pool.clone()).with_statement_timeout(config.statement_timeout);
    let table_config = Config {
        case_insensitive: config.case_insensitive,
        ..Config::default()
    };
    let state = ApiState::new(Arc::new(source), config.tables.iter().cloned())
        .with_config(table_config);

    let app = Router::new()
        .merge(http::router(state))
        .merge(health::router(pool))
        .layer(build_cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
