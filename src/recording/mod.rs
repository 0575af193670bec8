//! Recording readers.
//!
//! Modular architecture for reading multichannel time-series recording
//! formats. New formats are added by implementing the [`RecordingReader`]
//! trait and registering an extension in [`open_recording`].

use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod edf;
pub mod text;

pub use edf::{EdfReader, EdfSignalHeader, EdfWriter};
pub use text::TextReader;

/// Result type alias for reader operations
pub type ReaderResult<T> = Result<T, ReaderError>;

/// Errors that can occur while opening or reading a recording
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Static properties of an opened recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub file_name: String,
    pub file_size: u64,
    /// Samples per second, identical across channels
    pub sample_rate: f64,
    pub num_channels: usize,
    /// Total samples per channel
    pub num_samples: usize,
    /// Total duration in seconds
    pub duration: f64,
    pub channels: Vec<String>,
    /// Recording start time, RFC3339, when the format encodes one
    pub start_time: Option<String>,
    pub file_type: String,
}

/// One contiguous slice of samples across all requested channels.
///
/// `samples` is channel-major; `timestamps` runs parallel to the inner
/// vectors and is strictly increasing, in seconds from recording start.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    pub samples: Vec<Vec<f64>>,
    pub timestamps: Vec<f64>,
}

impl SampleWindow {
    pub fn num_samples(&self) -> usize {
        self.timestamps.len()
    }

    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }
}

/// Unified interface over recording file formats
pub trait RecordingReader: Send + Sync + std::fmt::Debug {
    /// Get metadata without loading sample data
    fn metadata(&self) -> ReaderResult<RecordingMetadata>;

    /// Read `num_samples` samples starting at `start_sample`, clamped to
    /// the end of the recording. `channels` selects a subset by label
    /// (None = all channels, in file order).
    fn read_window(
        &self,
        start_sample: usize,
        num_samples: usize,
        channels: Option<&[String]>,
    ) -> ReaderResult<SampleWindow>;

    /// Format name, e.g. "EDF" or "CSV"
    fn format_name(&self) -> &str;
}

/// Open a recording, selecting the reader by file extension.
pub fn open_recording(path: &Path) -> ReaderResult<Box<dyn RecordingReader>> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "edf" => Ok(Box::new(EdfReader::open(path)?)),
        "csv" => Ok(Box::new(TextReader::from_csv(path)?)),
        "txt" | "ascii" => Ok(Box::new(TextReader::from_ascii(path)?)),
        _ => Err(ReaderError::UnsupportedFormat(format!(
            "Unsupported file extension: {}",
            extension
        ))),
    }
}

/// File extensions [`open_recording`] accepts
pub fn supported_extensions() -> Vec<&'static str> {
    vec!["edf", "csv", "txt", "ascii"]
}

/// Check whether a path has a supported extension
pub fn is_supported(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        supported_extensions().contains(&ext.to_lowercase().as_str())
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("test.edf")));
        assert!(is_supported(Path::new("test.CSV")));
        assert!(is_supported(Path::new("test.txt")));
        assert!(!is_supported(Path::new("test.fif")));
        assert!(!is_supported(Path::new("noext")));
    }

    #[test]
    fn test_open_unknown_extension() {
        let err = open_recording(Path::new("recording.xyz")).unwrap_err();
        assert!(matches!(err, ReaderError::UnsupportedFormat(_)));
    }
}
