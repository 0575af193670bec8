use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::state::ServerState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub stored_recordings: usize,
    pub timestamp: String,
}

/// Root endpoint returning a service banner
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("eegstream v{}", env!("CARGO_PKG_VERSION"))
    }))
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let stored_recordings = state.store.list().map(|r| r.len()).unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        stored_recordings,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
