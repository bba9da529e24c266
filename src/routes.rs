//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod checkpoint;
mod run;
mod schema_diff;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Event streams are never compressed (tower-http skips text/event-stream)
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Governance runs
        .route("/api/runs", post(run::start_run))
        .route("/api/runs/{run_id}", get(run::get_run))
        .route("/api/runs/{run_id}/events", get(run::run_events))
        .route("/api/runs/{run_id}/decision", post(run::submit_decision))
        .route("/api/runs/{run_id}/cancel", post(run::cancel_run))

        // Ontology diff
        .route("/api/schema-diff", post(schema_diff::schema_diff))

        // Checkpoints
        .route("/api/sessions/{session_id}/checkpoints", get(checkpoint::list_checkpoints))
        .route(
            "/api/sessions/{session_id}/checkpoints/compare",
            get(checkpoint::compare_checkpoints),
        )
        .route(
            "/api/sessions/{session_id}/checkpoints/{checkpoint_id}",
            get(checkpoint::get_checkpoint),
        )
        .route(
            "/api/sessions/{session_id}/checkpoints/{checkpoint_id}/restore",
            post(checkpoint::restore_checkpoint),
        )

        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CACHE_CONTROL])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Relay is running.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
