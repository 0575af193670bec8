use std::collections::HashMap;
use std::io;
use std::time::Instant;

use parking_lot::RwLock;

use crate::config::ServerConfig;
use crate::recording::RecordingMetadata;
use crate::storage::FileStore;
use crate::stream::StreamSettings;

/// Shared state for all handlers
pub struct ServerState {
    pub config: ServerConfig,
    pub store: FileStore,
    /// Metadata of already-opened recordings, keyed by file id
    pub metadata_cache: RwLock<HashMap<String, RecordingMetadata>>,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> io::Result<Self> {
        let store = FileStore::new(config.storage_directory.clone())?;
        Ok(Self {
            config,
            store,
            metadata_cache: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        })
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Streaming knobs for new sessions, from configuration
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            downsample_stride: self.config.downsample_stride,
            pacing: self.config.stream_delay,
        }
    }
}
