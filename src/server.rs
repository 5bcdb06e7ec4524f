//! HTTP server.
//!
//! Exposes the notification router and the catalog query service over a
//! small JSON HTTP API. The event transport delivers notifications with
//! `POST /events`; catalog clients search with `GET /query`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/events` | Handle one notification, returns `{statusCode, body}` |
//! | `GET`  | `/query` | Search the catalog by query-string filters |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The HTTP status always equals the `statusCode` of the result, so a
//! rejected notification is a 400 and an infrastructure fault a 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based catalog
//! clients can call `/query` directly.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::indexer::{Indexer, IndexerResponse};
use crate::query;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    indexer: Indexer,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind`, loads the dependency
/// graph once, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let indexer = Indexer::from_config(config).await?;
    let app = router(indexer);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "sds server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the route table around an existing [`Indexer`].
pub fn router(indexer: Indexer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/events", post(handle_event))
        .route("/query", get(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { indexer })
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /events ============

/// Parses the body by hand: a malformed body or a missing content type still
/// gets a `{statusCode, body}` result.
async fn handle_event(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<IndexerResponse>) {
    let resp = match serde_json::from_slice::<Value>(&body) {
        Ok(event) => state.indexer.handle_event(&event).await,
        Err(e) => {
            warn!(error = %e, "notification body is not valid JSON");
            IndexerResponse::error(400, format!("Invalid JSON body: {}", e))
        }
    };
    (status_code(resp.status_code), Json(resp))
}

// ============ GET /query ============

async fn handle_query(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let resp = query::query(state.indexer.pool(), &params).await;
    (
        status_code(resp.status_code),
        [(header::CONTENT_TYPE, "application/json")],
        resp.body,
    )
        .into_response()
}
