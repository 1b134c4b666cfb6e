//! HTTP request handlers

use axum::{
    extract::{Path, State},
    Json,
};
use bluemgr_common::api::ActionResult;
use bluemgr_common::{ConnectionStatus, Device};
use serde::Serialize;
use tracing::info;

use super::AppState;
use crate::error::Result;
use crate::manager::{DebugSnapshot, SinkEntry};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "bluemgr-am".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /scan - blocks for the scan window
pub async fn scan(State(state): State<AppState>) -> Result<Json<Vec<Device>>> {
    Ok(Json(state.manager.scan().await?))
}

pub async fn paired(State(state): State<AppState>) -> Result<Json<Vec<Device>>> {
    Ok(Json(state.manager.paired().await?))
}

pub async fn connected(State(state): State<AppState>) -> Result<Json<ConnectionStatus>> {
    Ok(Json(state.manager.connection_status().await?))
}

pub async fn sinks(State(state): State<AppState>) -> Result<Json<Vec<SinkEntry>>> {
    Ok(Json(state.manager.sinks().await?))
}

pub async fn debug_snapshot(State(state): State<AppState>) -> Json<DebugSnapshot> {
    Json(state.manager.debug_snapshot().await)
}

/// POST /pair/:mac - runs the full pairing workflow before answering
pub async fn pair(
    State(state): State<AppState>,
    Path(mac): Path<String>,
) -> Result<Json<ActionResult>> {
    info!(mac = %mac, "Pair request");
    Ok(Json(state.manager.pair(&mac).await?))
}

pub async fn disconnect(State(state): State<AppState>) -> Json<ActionResult> {
    Json(state.manager.disconnect().await)
}

pub async fn remove(
    State(state): State<AppState>,
    Path(mac): Path<String>,
) -> Result<Json<ActionResult>> {
    Ok(Json(state.manager.remove(&mac).await?))
}

pub async fn restart_audio(State(state): State<AppState>) -> Json<ActionResult> {
    Json(state.manager.restart_audio().await)
}
