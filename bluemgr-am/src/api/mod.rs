//! HTTP API
//!
//! Thin axum layer over [`AudioManager`](crate::manager::AudioManager).

pub mod handlers;
pub mod sse;

use axum::{
    routing::{get, post},
    Router,
};
use bluemgr_common::events::EventBus;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};
use crate::manager::AudioManager;

/// Shared state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AudioManager>,
    pub events: EventBus,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Discovery and status
        .route("/scan", get(handlers::scan))
        .route("/paired", get(handlers::paired))
        .route("/connected", get(handlers::connected))
        .route("/sinks", get(handlers::sinks))
        .route("/debug", get(handlers::debug_snapshot))
        // Actions
        .route("/pair/:mac", post(handlers::pair))
        .route("/disconnect", post(handlers::disconnect))
        .route("/remove/:mac", post(handlers::remove))
        .route("/restart-audio", post(handlers::restart_audio))
        .route("/events", get(sse::event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` is cancelled
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))
}
