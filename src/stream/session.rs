// Streaming session: pulls one-second windows from a recording and
// pushes them, down-sampled, to a connected peer until the recording is
// exhausted, the peer disconnects, or a pull/send fails.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::recording::{RecordingReader, SampleWindow};
use crate::stream::types::{OutboundMessage, SendOutcome, SessionStatus, StreamSettings};

/// Transport side of a session. The WebSocket handler adapts the real
/// socket to this; tests substitute scripted doubles.
#[async_trait]
pub trait StreamSink: Send {
    /// Push one message to the peer.
    async fn send(&mut self, message: &OutboundMessage) -> SendOutcome;

    /// Release the connection. Called exactly once per session.
    async fn close(&mut self);
}

/// One end-to-end streaming interaction over an already-opened recording.
///
/// The session exclusively owns its reader for its lifetime; both the
/// reader and the sink are released when [`run`](Self::run) returns.
pub struct StreamSession {
    reader: Arc<dyn RecordingReader>,
    settings: StreamSettings,
}

impl StreamSession {
    pub fn new(reader: Arc<dyn RecordingReader>, settings: StreamSettings) -> Self {
        Self { reader, settings }
    }

    /// Drive the session to one of its terminal states.
    ///
    /// Messages go out strictly in increasing cursor order, gapless. A
    /// peer disconnect ends the session silently within one pull/send
    /// cycle; any other failure sends exactly one error message, always
    /// as the final message.
    pub async fn run(self, sink: &mut dyn StreamSink) -> SessionStatus {
        let meta = match self.reader.metadata() {
            Ok(meta) => meta,
            Err(e) => return Self::fail(sink, e.to_string()).await,
        };

        // One second of source samples per window, regardless of how
        // much of it the stride lets through.
        let window_size = (meta.sample_rate.round() as usize).max(1);
        let stride = self.settings.downsample_stride.max(1);

        info!(
            "streaming {} channels at {} Hz, {} samples, window {} stride {}",
            meta.num_channels, meta.sample_rate, meta.num_samples, window_size, stride
        );

        let mut cursor = 0usize;
        while cursor < meta.num_samples {
            let want = window_size.min(meta.num_samples - cursor);
            let reader = Arc::clone(&self.reader);
            let pulled =
                tokio::task::spawn_blocking(move || reader.read_window(cursor, want, None)).await;

            let window = match pulled {
                Ok(Ok(window)) => window,
                Ok(Err(e)) => return Self::fail(sink, e.to_string()).await,
                Err(e) => return Self::fail(sink, format!("Read task failed: {}", e)).await,
            };

            let message = downsample(&window, stride);
            match sink.send(&message).await {
                SendOutcome::Sent => {}
                SendOutcome::Disconnected => {
                    // A disconnect is not an error: stop pulling, send
                    // nothing further.
                    debug!("peer disconnected at sample {}", cursor);
                    sink.close().await;
                    return SessionStatus::ClosedDisconnected;
                }
                SendOutcome::Failed(reason) => return Self::fail(sink, reason).await,
            }

            cursor += window_size;

            if let Some(delay) = self.settings.pacing {
                sleep(delay).await;
            }
        }

        sink.close().await;
        SessionStatus::ClosedComplete
    }

    async fn fail(sink: &mut dyn StreamSink, reason: String) -> SessionStatus {
        warn!("stream session failed: {}", reason);
        let message = OutboundMessage::Error { error: reason };
        if let SendOutcome::Failed(e) = sink.send(&message).await {
            warn!("could not deliver error message: {}", e);
        }
        sink.close().await;
        SessionStatus::ClosedError
    }
}

/// Retain every `stride`-th sample of the window. `t` is the timestamp
/// of the first retained sample.
fn downsample(window: &SampleWindow, stride: usize) -> OutboundMessage {
    let data = window
        .samples
        .iter()
        .map(|channel| channel.iter().step_by(stride).copied().collect())
        .collect();
    let t = window.timestamps.first().copied().unwrap_or(0.0);
    OutboundMessage::Data { t, data }
}
