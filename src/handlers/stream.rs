use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::handlers::files::resolve;
use crate::recording::{self, RecordingReader};
use crate::state::ServerState;
use crate::stream::{
    OutboundMessage, SendOutcome, StreamSession, StreamSettings, StreamSink,
};

/// WebSocket endpoint streaming a stored recording's samples.
///
/// An unknown identifier is rejected with HTTP 404 before the upgrade;
/// the streaming protocol has no in-band not-found message and no
/// session ever exists for it.
pub async fn stream_recording(
    State(state): State<Arc<ServerState>>,
    Path(file_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let path = resolve(&state, &file_id)?;
    let settings = state.stream_settings();

    Ok(ws.on_upgrade(move |socket| handle_stream_socket(socket, file_id, path, settings)))
}

async fn handle_stream_socket(
    socket: WebSocket,
    file_id: String,
    path: PathBuf,
    settings: StreamSettings,
) {
    let mut sink = WsSink::new(socket);

    let open_path = path.clone();
    let opened =
        tokio::task::spawn_blocking(move || recording::open_recording(&open_path)).await;

    let reader: Arc<dyn RecordingReader> = match opened {
        Ok(Ok(reader)) => Arc::from(reader),
        Ok(Err(e)) => {
            // Open failure: exactly one error message, then close.
            warn!("could not open recording {}: {}", file_id, e);
            let message = OutboundMessage::Error {
                error: format!("Could not read recording: {}", e),
            };
            let _ = sink.send(&message).await;
            sink.close().await;
            return;
        }
        Err(e) => {
            warn!("open task for {} failed: {}", file_id, e);
            let message = OutboundMessage::Error {
                error: format!("Could not open recording: {}", e),
            };
            let _ = sink.send(&message).await;
            sink.close().await;
            return;
        }
    };

    info!("stream session started for {}", file_id);
    let status = StreamSession::new(reader, settings).run(&mut sink).await;
    info!("stream session for {} ended: {:?}", file_id, status);
}

/// Adapts an axum WebSocket to the session's sink contract.
///
/// A transport-level send failure is reported as a disconnect: axum
/// surfaces a closed peer as an error on send, and the protocol defines
/// no other transport failure worth distinguishing. Serialization
/// failures are genuine errors.
struct WsSink {
    socket: WebSocket,
}

impl WsSink {
    fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait::async_trait]
impl StreamSink for WsSink {
    async fn send(&mut self, message: &OutboundMessage) -> SendOutcome {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => return SendOutcome::Failed(format!("Failed to serialize message: {}", e)),
        };

        match self.socket.send(Message::Text(json.into())).await {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::Disconnected,
        }
    }

    async fn close(&mut self) {
        // Best effort: the peer may already be gone
        let _ = self.socket.send(Message::Close(None)).await;
    }
}
