//! Chunked sample streaming over a persistent connection.

pub mod session;
pub mod types;

pub use session::{StreamSession, StreamSink};
pub use types::{OutboundMessage, SendOutcome, SessionStatus, StreamSettings};
