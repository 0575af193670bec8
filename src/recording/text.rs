// Text-based recording reader (CSV and whitespace-separated ASCII).
//
// Format assumptions:
// - First row may contain channel names (detected if non-numeric)
// - Each column is a channel, each row a time point
// - No sampling rate is encoded; 1 Hz is assumed

use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{ReaderError, ReaderResult, RecordingMetadata, RecordingReader, SampleWindow};

// Text formats carry no timing metadata
const TEXT_SAMPLE_RATE: f64 = 1.0;

#[derive(Debug)]
pub struct TextReader {
    file_name: String,
    file_size: u64,
    file_type: &'static str,
    channel_labels: Vec<String>,
    data: Vec<Vec<f64>>, // [channel][sample]
}

impl TextReader {
    /// Read a CSV file (comma-separated)
    pub fn from_csv<P: AsRef<Path>>(path: P) -> ReaderResult<Self> {
        Self::read_file(path, Some(','), "CSV")
    }

    /// Read an ASCII file (whitespace-separated)
    pub fn from_ascii<P: AsRef<Path>>(path: P) -> ReaderResult<Self> {
        Self::read_file(path, None, "ASCII")
    }

    fn read_file<P: AsRef<Path>>(
        path: P,
        delimiter: Option<char>,
        file_type: &'static str,
    ) -> ReaderResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let reader = BufReader::new(file);
        let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;

        if lines.is_empty() {
            return Err(ReaderError::InvalidData("File is empty".to_string()));
        }

        let first_row = Self::parse_line(&lines[0], delimiter);
        if first_row.is_empty() {
            return Err(ReaderError::InvalidData(
                "First line contains no values".to_string(),
            ));
        }

        // A non-numeric first row is a header
        let has_header = first_row.iter().any(|s| s.parse::<f64>().is_err());
        let (channel_labels, data_start_idx) = if has_header {
            (first_row, 1)
        } else {
            let labels = (0..first_row.len())
                .map(|i| format!("Channel {}", i + 1))
                .collect();
            (labels, 0)
        };

        let num_channels = channel_labels.len();

        let parsed_rows: Vec<Vec<f64>> = lines
            .par_iter()
            .enumerate()
            .skip(data_start_idx)
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_idx, line)| {
                let values = Self::parse_line(line, delimiter);
                if values.len() != num_channels {
                    return Err(ReaderError::Parse(format!(
                        "Line {} has {} values, expected {} channels",
                        line_idx + 1,
                        values.len(),
                        num_channels
                    )));
                }
                values
                    .iter()
                    .map(|value| {
                        value.parse::<f64>().map_err(|_| {
                            ReaderError::Parse(format!(
                                "Invalid numeric value '{}' at line {}",
                                value,
                                line_idx + 1
                            ))
                        })
                    })
                    .collect()
            })
            .collect::<ReaderResult<_>>()?;

        // Transpose rows to channel-major storage
        let num_samples = parsed_rows.len();
        let mut data = vec![Vec::with_capacity(num_samples); num_channels];
        for row in &parsed_rows {
            for (ch, &value) in row.iter().enumerate() {
                data[ch].push(value);
            }
        }

        Ok(Self {
            file_name: path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string(),
            file_size,
            file_type,
            channel_labels,
            data,
        })
    }

    fn parse_line(line: &str, delimiter: Option<char>) -> Vec<String> {
        match delimiter {
            Some(d) => line.split(d).map(|s| s.trim().to_string()).collect(),
            None => line
                .split_whitespace()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn num_samples(&self) -> usize {
        self.data.first().map(|ch| ch.len()).unwrap_or(0)
    }

    fn channel_indices(&self, channels: Option<&[String]>) -> Vec<usize> {
        match channels {
            Some(selected) => selected
                .iter()
                .filter_map(|name| self.channel_labels.iter().position(|l| l == name))
                .collect(),
            None => (0..self.channel_labels.len()).collect(),
        }
    }
}

impl RecordingReader for TextReader {
    fn metadata(&self) -> ReaderResult<RecordingMetadata> {
        let num_samples = self.num_samples();
        Ok(RecordingMetadata {
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            sample_rate: TEXT_SAMPLE_RATE,
            num_channels: self.channel_labels.len(),
            num_samples,
            duration: num_samples as f64 / TEXT_SAMPLE_RATE,
            channels: self.channel_labels.clone(),
            start_time: None,
            file_type: self.file_type.to_string(),
        })
    }

    fn read_window(
        &self,
        start_sample: usize,
        num_samples: usize,
        channels: Option<&[String]>,
    ) -> ReaderResult<SampleWindow> {
        let total = self.num_samples();
        let start = start_sample.min(total);
        let count = num_samples.min(total - start);
        let indices = self.channel_indices(channels);

        let samples = indices
            .iter()
            .map(|&ch| self.data[ch][start..start + count].to_vec())
            .collect();
        let timestamps = (0..count)
            .map(|i| (start + i) as f64 / TEXT_SAMPLE_RATE)
            .collect();

        Ok(SampleWindow {
            samples,
            timestamps,
        })
    }

    fn format_name(&self) -> &str {
        self.file_type
    }
}
