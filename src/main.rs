//! GovFlow API - Governance Relay
//!
//! Sits between the governance UI and the AI analysis backend.
//!
//! RESULT DELIVERY: analysis runs stream their progress as text/event-stream
//! frames. The relay decodes them incrementally, pauses for human review when
//! the backend asks for it, and materializes the final ontology.
//!
//! ONTOLOGY DIFF: governed objects can be compared against the original
//! table metadata (field level) or against any earlier checkpoint of the
//! same session (entity level).

mod backend;
mod config;
mod diff;
mod error;
mod models;
mod routes;
mod runs;
mod state;
mod stream;

use crate::config::Settings;
use crate::routes::create_router;
use crate::runs::spawn_cleanup_task;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting GovFlow governance relay...");

    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");
    info!("🔗 Analysis backend: {}", settings.backend.base_url);

    let state = Arc::new(AppState::new(&settings)?);
    spawn_cleanup_task(state.runs.clone(), settings.runs.cleanup_interval());

    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Governance Runs ───");
    info!("   POST /api/runs                       - Start an analysis run");
    info!("   GET  /api/runs/{{id}}                  - Run state and thinking log");
    info!("   GET  /api/runs/{{id}}/events           - Live events (SSE)");
    info!("   POST /api/runs/{{id}}/decision         - Confirm or modify proposed objects");
    info!("   POST /api/runs/{{id}}/cancel           - Cancel a run");
    info!("");
    info!("   ─── Ontology Diff ───");
    info!("   POST /api/schema-diff                - Field changes against original metadata");
    info!("   GET  /api/sessions/{{id}}/checkpoints  - Checkpoint history");
    info!("   GET  /api/sessions/{{id}}/checkpoints/compare - Compare two checkpoints");
    info!("   POST /api/sessions/{{id}}/checkpoints/{{cp}}/restore - Restore a checkpoint");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,govflow_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
