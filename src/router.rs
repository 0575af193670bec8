use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    get_recording_data, get_recording_metadata, health, list_recordings, root, stream_recording,
    upload_recording,
};
use crate::state::ServerState;

pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors_origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let max_body = state.config.max_upload_size as usize;

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route(
            "/api/recordings",
            get(list_recordings).post(upload_recording),
        )
        .route(
            "/api/recordings/{file_id}/metadata",
            get(get_recording_metadata),
        )
        .route("/api/recordings/{file_id}/data", get(get_recording_data))
        .route("/ws/stream/{file_id}", get(stream_recording))
        .fallback(handle_404)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn handle_404() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Endpoint not found",
            "message": "The requested endpoint does not exist"
        })),
    )
}
