// Common types for the streaming module

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Terminal disposition of a streaming session.
///
/// Transitions are one-way: a running session ends in exactly one of
/// these and never resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The recording was streamed to the end
    ClosedComplete,
    /// The peer went away mid-stream; not an error
    ClosedDisconnected,
    /// A pull or send failed; one error message was sent first
    ClosedError,
}

/// One frame sent to the peer.
///
/// Exactly two shapes exist on the wire: a data message carrying the
/// timestamp of its first sample and a channel-major amplitude matrix,
/// or an error message. An error message is always the session's last.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Data { t: f64, data: Vec<Vec<f64>> },
    Error { error: String },
}

/// Result of pushing one message to the peer, as data rather than as a
/// caught exception: the session branches on this explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The transport reports the peer is gone
    Disconnected,
    /// The message could not be produced or sent for another reason
    Failed(String),
}

/// Per-session streaming knobs
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Every Nth sample of a window is transmitted
    pub downsample_stride: usize,
    /// Optional delay after each window. None means no pacing: the
    /// session sends as fast as the transport drains.
    pub pacing: Option<Duration>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            downsample_stride: 10,
            pacing: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_message_shape() {
        let msg = OutboundMessage::Data {
            t: 1.5,
            data: vec![vec![0.25, 0.5], vec![-0.25, -0.5]],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], 1.5);
        assert_eq!(json["data"][1][0], -0.25);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_message_shape() {
        let msg = OutboundMessage::Error {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["error"], "boom");
        assert!(json.get("t").is_none());
    }
}
