use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::recording::{self, RecordingMetadata};
use crate::state::ServerState;
use crate::storage::StoredRecording;

/// Response for a stored upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_id: String,
    pub filename: String,
}

/// Metadata of a stored recording, addressed by its identifier
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub file_id: String,
    #[serde(flatten)]
    pub metadata: RecordingMetadata,
}

/// One contiguous slice of samples from a stored recording
#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkData {
    pub data: Vec<Vec<f64>>,
    pub channel_labels: Vec<String>,
    pub sampling_frequency: f64,
    pub chunk_start: usize,
    pub chunk_size: usize,
    pub total_samples: usize,
}

/// Store an uploaded recording, verifying that a reader can open it.
pub async fn upload_recording(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut uploaded: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart data: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "upload.edf".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;

        if data.len() as u64 > state.config.max_upload_size {
            return Err(ApiError::BadRequest(format!(
                "File too large. Maximum size: {} bytes",
                state.config.max_upload_size
            )));
        }

        uploaded = Some((filename, data.to_vec()));
    }

    let (filename, data) =
        uploaded.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    let (file_id, path) = state
        .store
        .save(&filename, &data)
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to save file: {}", e)))?;

    // Basic validity check: a reader must be able to open the stored
    // copy; anything unreadable is removed again.
    let probe_path = path.clone();
    let opened = tokio::task::spawn_blocking(move || {
        recording::open_recording(&probe_path).and_then(|reader| reader.metadata())
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Task join error: {}", e)))?;

    if let Err(e) = opened {
        warn!("rejecting upload {}: {}", filename, e);
        if let Err(remove_err) = state.store.remove(&path).await {
            warn!("could not remove rejected upload: {}", remove_err);
        }
        return Err(ApiError::BadRequest(format!(
            "Could not read file as a recording: {}",
            e
        )));
    }

    info!("stored recording {} as {}", filename, file_id);

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        file_id,
        filename,
    }))
}

/// List every stored recording.
pub async fn list_recordings(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<StoredRecording>>, ApiError> {
    state
        .store
        .list()
        .map(Json)
        .map_err(|e| ApiError::InternalError(format!("Failed to list recordings: {}", e)))
}

/// Metadata for one stored recording.
pub async fn get_recording_metadata(
    State(state): State<Arc<ServerState>>,
    Path(file_id): Path<String>,
) -> Result<Json<RecordingInfo>, ApiError> {
    {
        let cache = state.metadata_cache.read();
        if let Some(metadata) = cache.get(&file_id) {
            return Ok(Json(RecordingInfo {
                file_id,
                metadata: metadata.clone(),
            }));
        }
    }

    let path = resolve(&state, &file_id)?;
    let metadata = read_metadata(path).await?;

    {
        let mut cache = state.metadata_cache.write();
        cache.insert(file_id.clone(), metadata.clone());
    }

    Ok(Json(RecordingInfo { file_id, metadata }))
}

/// Query params for range reads
#[derive(Debug, Deserialize)]
pub struct DataQuery {
    #[serde(default)]
    pub start_time: f64,
    pub duration: Option<f64>,
    /// Comma-separated channel labels; absent = all channels
    pub channels: Option<String>,
}

const DEFAULT_CHUNK_DURATION: f64 = 30.0;

/// Read a slice of samples from a stored recording.
pub async fn get_recording_data(
    State(state): State<Arc<ServerState>>,
    Path(file_id): Path<String>,
    Query(query): Query<DataQuery>,
) -> Result<Json<ChunkData>, ApiError> {
    if query.start_time < 0.0 {
        return Err(ApiError::BadRequest(
            "start_time must be non-negative".to_string(),
        ));
    }
    let duration = query.duration.unwrap_or(DEFAULT_CHUNK_DURATION);
    if duration <= 0.0 {
        return Err(ApiError::BadRequest(
            "duration must be positive".to_string(),
        ));
    }

    let selected: Option<Vec<String>> = query
        .channels
        .map(|s| s.split(',').map(|c| c.trim().to_string()).collect());

    let path = resolve(&state, &file_id)?;
    let start_time = query.start_time;

    let chunk = tokio::task::spawn_blocking(move || -> Result<ChunkData, ApiError> {
        let reader = recording::open_recording(&path)?;
        let metadata = reader.metadata()?;

        let start_sample = (start_time * metadata.sample_rate) as usize;
        let num_samples = (duration * metadata.sample_rate) as usize;

        let window = reader.read_window(
            start_sample,
            num_samples,
            selected.as_deref(),
        )?;

        let channel_labels = match selected {
            Some(labels) => labels,
            None => metadata.channels,
        };

        Ok(ChunkData {
            chunk_size: window.num_samples(),
            data: window.samples,
            channel_labels,
            sampling_frequency: metadata.sample_rate,
            chunk_start: start_sample,
            total_samples: metadata.num_samples,
        })
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Task join error: {}", e)))??;

    Ok(Json(chunk))
}

pub(crate) fn resolve(state: &ServerState, file_id: &str) -> Result<PathBuf, ApiError> {
    state
        .store
        .resolve(file_id)
        .ok_or_else(|| ApiError::NotFound(file_id.to_string()))
}

async fn read_metadata(path: PathBuf) -> Result<RecordingMetadata, ApiError> {
    let metadata = tokio::task::spawn_blocking(move || {
        recording::open_recording(&path).and_then(|reader| reader.metadata())
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Task join error: {}", e)))??;
    Ok(metadata)
}
