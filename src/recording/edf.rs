// EDF (European Data Format) reader/writer.
// Specification: https://www.edfplus.info/specs/edf.html

use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::{ReaderError, ReaderResult, RecordingMetadata, RecordingReader, SampleWindow};

#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub version: String,              // 8 bytes: version of this data format (0)
    pub patient_id: String,           // 80 bytes: local patient identification
    pub recording_id: String,         // 80 bytes: local recording identification
    pub start_date: String,           // 8 bytes: startdate of recording (dd.mm.yy)
    pub start_time: String,           // 8 bytes: starttime of recording (hh.mm.ss)
    pub header_bytes: usize,          // 8 bytes: number of bytes in header record
    pub num_data_records: i64,        // 8 bytes: number of data records (-1 if unknown)
    pub duration_of_data_record: f64, // 8 bytes: duration of a data record, in seconds
    pub num_signals: usize,           // 4 bytes: number of signals (channels)
}

#[derive(Debug, Clone)]
pub struct EdfSignalHeader {
    pub label: String,                 // 16 bytes: label (e.g. EEG Fpz-Cz)
    pub transducer_type: String,       // 80 bytes
    pub physical_dimension: String,    // 8 bytes: e.g. uV
    pub physical_minimum: f64,         // 8 bytes
    pub physical_maximum: f64,         // 8 bytes
    pub digital_minimum: i64,          // 8 bytes
    pub digital_maximum: i64,          // 8 bytes
    pub prefiltering: String,          // 80 bytes
    pub num_samples_per_record: usize, // 8 bytes
}

impl EdfSignalHeader {
    pub fn sample_frequency(&self, record_duration: f64) -> f64 {
        self.num_samples_per_record as f64 / record_duration
    }

    pub fn gain(&self) -> f64 {
        (self.physical_maximum - self.physical_minimum)
            / (self.digital_maximum - self.digital_minimum) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_maximum - self.gain() * self.digital_maximum as f64
    }
}

#[derive(Debug)]
pub struct EdfReader {
    file: Mutex<BufReader<File>>,
    pub header: EdfHeader,
    pub signal_headers: Vec<EdfSignalHeader>,
    data_start_offset: u64,
    file_name: String,
    file_size: u64,
}

impl EdfReader {
    pub fn open<P: AsRef<Path>>(path: P) -> ReaderResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut file = BufReader::new(file);

        // Main header is a fixed 256 bytes, then 256 bytes per signal
        let header = Self::read_header(&mut file)?;
        let signal_headers = Self::read_signal_headers(&mut file, header.num_signals)?;

        if signal_headers.is_empty() {
            return Err(ReaderError::InvalidData("EDF file has no signals".into()));
        }
        if header.duration_of_data_record <= 0.0 {
            return Err(ReaderError::InvalidData(
                "EDF data record duration must be positive".into(),
            ));
        }
        for sh in &signal_headers {
            if sh.digital_maximum == sh.digital_minimum {
                return Err(ReaderError::InvalidData(format!(
                    "Signal '{}' has an empty digital range",
                    sh.label
                )));
            }
            // One sample rate across the whole recording; EDF+ mixed-rate
            // files are out of scope.
            if sh.num_samples_per_record != signal_headers[0].num_samples_per_record {
                return Err(ReaderError::UnsupportedFormat(
                    "Signals with differing sample rates are not supported".into(),
                ));
            }
        }

        let data_start_offset = header.header_bytes as u64;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            file: Mutex::new(file),
            header,
            signal_headers,
            data_start_offset,
            file_name,
            file_size,
        })
    }

    fn read_fixed_string<R: Read>(reader: &mut R, size: usize) -> ReaderResult<String> {
        let mut buffer = vec![0u8; size];
        reader.read_exact(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).trim().to_string())
    }

    fn read_numeric_field<R: Read, T: std::str::FromStr>(
        reader: &mut R,
        size: usize,
        what: &str,
    ) -> ReaderResult<T> {
        let s = Self::read_fixed_string(reader, size)?;
        s.trim()
            .parse::<T>()
            .map_err(|_| ReaderError::Parse(format!("Invalid {} '{}'", what, s)))
    }

    fn read_header<R: Read>(reader: &mut R) -> ReaderResult<EdfHeader> {
        let version = Self::read_fixed_string(reader, 8)?;
        let patient_id = Self::read_fixed_string(reader, 80)?;
        let recording_id = Self::read_fixed_string(reader, 80)?;
        let start_date = Self::read_fixed_string(reader, 8)?;
        let start_time = Self::read_fixed_string(reader, 8)?;
        let header_bytes = Self::read_numeric_field(reader, 8, "header byte count")?;
        let _reserved = Self::read_fixed_string(reader, 44)?;
        let num_data_records = Self::read_numeric_field(reader, 8, "number of data records")?;
        let duration_of_data_record = Self::read_numeric_field(reader, 8, "record duration")?;
        let num_signals = Self::read_numeric_field(reader, 4, "number of signals")?;

        Ok(EdfHeader {
            version,
            patient_id,
            recording_id,
            start_date,
            start_time,
            header_bytes,
            num_data_records,
            duration_of_data_record,
            num_signals,
        })
    }

    // Signal headers are stored field-major: all labels, then all
    // transducer types, and so on.
    fn read_signal_headers<R: Read>(
        reader: &mut R,
        num_signals: usize,
    ) -> ReaderResult<Vec<EdfSignalHeader>> {
        let mut labels = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            labels.push(Self::read_fixed_string(reader, 16)?);
        }
        let mut transducer_types = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            transducer_types.push(Self::read_fixed_string(reader, 80)?);
        }
        let mut physical_dimensions = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            physical_dimensions.push(Self::read_fixed_string(reader, 8)?);
        }
        let mut physical_minimums = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            physical_minimums.push(Self::read_numeric_field(reader, 8, "physical minimum")?);
        }
        let mut physical_maximums = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            physical_maximums.push(Self::read_numeric_field(reader, 8, "physical maximum")?);
        }
        let mut digital_minimums = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            digital_minimums.push(Self::read_numeric_field(reader, 8, "digital minimum")?);
        }
        let mut digital_maximums = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            digital_maximums.push(Self::read_numeric_field(reader, 8, "digital maximum")?);
        }
        let mut prefilterings = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            prefilterings.push(Self::read_fixed_string(reader, 80)?);
        }
        let mut samples_per_record = Vec::with_capacity(num_signals);
        for _ in 0..num_signals {
            samples_per_record.push(Self::read_numeric_field(reader, 8, "samples per record")?);
        }
        for _ in 0..num_signals {
            let _reserved = Self::read_fixed_string(reader, 32)?;
        }

        let mut signal_headers = Vec::with_capacity(num_signals);
        for i in 0..num_signals {
            signal_headers.push(EdfSignalHeader {
                label: labels[i].clone(),
                transducer_type: transducer_types[i].clone(),
                physical_dimension: physical_dimensions[i].clone(),
                physical_minimum: physical_minimums[i],
                physical_maximum: physical_maximums[i],
                digital_minimum: digital_minimums[i],
                digital_maximum: digital_maximums[i],
                prefiltering: prefilterings[i].clone(),
                num_samples_per_record: samples_per_record[i],
            });
        }

        Ok(signal_headers)
    }

    fn samples_per_record(&self) -> usize {
        self.signal_headers[0].num_samples_per_record
    }

    pub fn sample_rate(&self) -> f64 {
        self.signal_headers[0].sample_frequency(self.header.duration_of_data_record)
    }

    pub fn total_samples(&self) -> usize {
        self.header.num_data_records.max(0) as usize * self.samples_per_record()
    }

    pub fn total_duration(&self) -> f64 {
        self.header.num_data_records.max(0) as f64 * self.header.duration_of_data_record
    }

    /// Read one data record as raw digital samples, one row per signal.
    fn read_record(
        &self,
        file: &mut BufReader<File>,
        record_index: usize,
    ) -> ReaderResult<Vec<Vec<i16>>> {
        if record_index >= self.header.num_data_records.max(0) as usize {
            return Err(ReaderError::InvalidData(format!(
                "Record index {} out of bounds (max {})",
                record_index,
                self.header.num_data_records - 1
            )));
        }

        // Each sample is a 16-bit little-endian integer
        let record_size: usize = self
            .signal_headers
            .iter()
            .map(|sh| sh.num_samples_per_record * 2)
            .sum();

        let record_offset = self.data_start_offset + (record_index * record_size) as u64;
        file.seek(SeekFrom::Start(record_offset))?;

        let mut buf = vec![0u8; record_size];
        file.read_exact(&mut buf)?;

        let mut signals = Vec::with_capacity(self.signal_headers.len());
        let mut pos = 0;
        for sh in &self.signal_headers {
            let samples = buf[pos..pos + sh.num_samples_per_record * 2]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect();
            pos += sh.num_samples_per_record * 2;
            signals.push(samples);
        }

        Ok(signals)
    }

    fn channel_indices(&self, channels: Option<&[String]>) -> Vec<usize> {
        match channels {
            Some(selected) => selected
                .iter()
                .filter_map(|name| self.signal_headers.iter().position(|sh| &sh.label == name))
                .collect(),
            None => (0..self.signal_headers.len()).collect(),
        }
    }

    fn start_time_rfc3339(&self) -> Option<String> {
        parse_edf_datetime(&self.header.start_date, &self.header.start_time)
    }
}

impl RecordingReader for EdfReader {
    fn metadata(&self) -> ReaderResult<RecordingMetadata> {
        let sample_rate = self.sample_rate();
        Ok(RecordingMetadata {
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            sample_rate,
            num_channels: self.signal_headers.len(),
            num_samples: self.total_samples(),
            duration: self.total_duration(),
            channels: self.signal_headers.iter().map(|sh| sh.label.clone()).collect(),
            start_time: self.start_time_rfc3339(),
            file_type: "EDF".to_string(),
        })
    }

    fn read_window(
        &self,
        start_sample: usize,
        num_samples: usize,
        channels: Option<&[String]>,
    ) -> ReaderResult<SampleWindow> {
        let spr = self.samples_per_record();
        let total = self.total_samples();
        let start = start_sample.min(total);
        let count = num_samples.min(total - start);
        let indices = self.channel_indices(channels);

        let mut digital: Vec<Vec<i16>> = indices
            .iter()
            .map(|_| Vec::with_capacity(count))
            .collect();

        if count > 0 {
            let first_record = start / spr;
            let last_record = (start + count - 1) / spr;
            let mut file = self.file.lock();

            for record_idx in first_record..=last_record {
                let record = self.read_record(&mut file, record_idx)?;
                let record_start = record_idx * spr;
                let lo = start.max(record_start) - record_start;
                let hi = (start + count).min(record_start + spr) - record_start;
                for (row, &ch) in indices.iter().enumerate() {
                    digital[row].extend_from_slice(&record[ch][lo..hi]);
                }
            }
        }

        // Digital-to-physical conversion in parallel across channels
        let samples: Vec<Vec<f64>> = indices
            .par_iter()
            .zip(digital.par_iter())
            .map(|(&ch, row)| {
                let sh = &self.signal_headers[ch];
                let gain = sh.gain();
                let offset = sh.offset();
                row.iter().map(|&d| gain * d as f64 + offset).collect()
            })
            .collect();

        let sample_rate = self.sample_rate();
        let timestamps = (0..count)
            .map(|i| (start + i) as f64 / sample_rate)
            .collect();

        Ok(SampleWindow {
            samples,
            timestamps,
        })
    }

    fn format_name(&self) -> &str {
        "EDF"
    }
}

/// Parse the EDF "dd.mm.yy" / "hh.mm.ss" header fields to RFC3339.
/// Per the EDF spec, two-digit years 85-99 mean 1985-1999.
fn parse_edf_datetime(date: &str, time: &str) -> Option<String> {
    let mut date_parts = date.split('.');
    let day: u32 = date_parts.next()?.trim().parse().ok()?;
    let month: u32 = date_parts.next()?.trim().parse().ok()?;
    let yy: i32 = date_parts.next()?.trim().parse().ok()?;
    let year = if yy >= 85 { 1900 + yy } else { 2000 + yy };

    let mut time_parts = time.split('.');
    let hour: u32 = time_parts.next()?.trim().parse().ok()?;
    let minute: u32 = time_parts.next()?.trim().parse().ok()?;
    let second: u32 = time_parts.next()?.trim().parse().ok()?;

    let datetime = chrono::NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)?;
    Some(format!("{}", datetime.format("%Y-%m-%dT%H:%M:%S")))
}

/// Minimal EDF writer, used to produce recordings in tests and tools.
pub struct EdfWriter {
    file: File,
    header: EdfHeader,
    signal_headers: Vec<EdfSignalHeader>,
}

impl EdfWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        patient_id: &str,
        recording_id: &str,
        record_duration: f64,
        signal_headers: Vec<EdfSignalHeader>,
    ) -> ReaderResult<Self> {
        let num_signals = signal_headers.len();
        let header = EdfHeader {
            version: "0".to_string(),
            patient_id: patient_id.to_string(),
            recording_id: recording_id.to_string(),
            start_date: "01.01.24".to_string(),
            start_time: "00.00.00".to_string(),
            header_bytes: 256 + num_signals * 256,
            num_data_records: -1, // patched by finalize()
            duration_of_data_record: record_duration,
            num_signals,
        };

        let file = File::create(path)?;
        let mut writer = Self {
            file,
            header,
            signal_headers,
        };
        writer.write_header()?;
        Ok(writer)
    }

    fn write_fixed_string(&mut self, s: &str, size: usize) -> ReaderResult<()> {
        let mut buffer = vec![b' '; size];
        let bytes = s.as_bytes();
        let copy_len = bytes.len().min(size);
        buffer[..copy_len].copy_from_slice(&bytes[..copy_len]);
        self.file.write_all(&buffer)?;
        Ok(())
    }

    fn write_header(&mut self) -> ReaderResult<()> {
        let header = self.header.clone();
        self.write_fixed_string(&header.version, 8)?;
        self.write_fixed_string(&header.patient_id, 80)?;
        self.write_fixed_string(&header.recording_id, 80)?;
        self.write_fixed_string(&header.start_date, 8)?;
        self.write_fixed_string(&header.start_time, 8)?;
        self.write_fixed_string(&header.header_bytes.to_string(), 8)?;
        self.write_fixed_string("", 44)?;
        self.write_fixed_string(&header.num_data_records.to_string(), 8)?;
        self.write_fixed_string(&header.duration_of_data_record.to_string(), 8)?;
        self.write_fixed_string(&header.num_signals.to_string(), 4)?;

        let signal_headers = self.signal_headers.clone();
        for sh in &signal_headers {
            self.write_fixed_string(&sh.label, 16)?;
        }
        for sh in &signal_headers {
            self.write_fixed_string(&sh.transducer_type, 80)?;
        }
        for sh in &signal_headers {
            self.write_fixed_string(&sh.physical_dimension, 8)?;
        }
        for sh in &signal_headers {
            self.write_fixed_string(&sh.physical_minimum.to_string(), 8)?;
        }
        for sh in &signal_headers {
            self.write_fixed_string(&sh.physical_maximum.to_string(), 8)?;
        }
        for sh in &signal_headers {
            self.write_fixed_string(&sh.digital_minimum.to_string(), 8)?;
        }
        for sh in &signal_headers {
            self.write_fixed_string(&sh.digital_maximum.to_string(), 8)?;
        }
        for sh in &signal_headers {
            self.write_fixed_string(&sh.prefiltering, 80)?;
        }
        for sh in &signal_headers {
            self.write_fixed_string(&sh.num_samples_per_record.to_string(), 8)?;
        }
        for _ in &signal_headers {
            self.write_fixed_string("", 32)?;
        }

        Ok(())
    }

    /// Write one data record of physical values, one row per signal.
    pub fn write_physical_record(&mut self, physical_data: &[Vec<f64>]) -> ReaderResult<()> {
        if physical_data.len() != self.signal_headers.len() {
            return Err(ReaderError::InvalidData(format!(
                "Expected {} signals, got {}",
                self.signal_headers.len(),
                physical_data.len()
            )));
        }

        for (signal_idx, physical_samples) in physical_data.iter().enumerate() {
            let sh = &self.signal_headers[signal_idx];
            if physical_samples.len() != sh.num_samples_per_record {
                return Err(ReaderError::InvalidData(format!(
                    "Signal {} expected {} samples, got {}",
                    signal_idx,
                    sh.num_samples_per_record,
                    physical_samples.len()
                )));
            }

            let gain = sh.gain();
            let offset = sh.offset();
            for &physical in physical_samples {
                let digital = ((physical - offset) / gain).round() as i16;
                self.file.write_all(&digital.to_le_bytes())?;
            }
        }

        Ok(())
    }

    /// Patch the record count into the header and flush.
    pub fn finalize(mut self, num_records_written: i64) -> ReaderResult<()> {
        self.file.seek(SeekFrom::Start(236))?;
        self.write_fixed_string(&num_records_written.to_string(), 8)?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn test_signal_header(label: &str, samples_per_record: usize) -> EdfSignalHeader {
        EdfSignalHeader {
            label: label.to_string(),
            transducer_type: "".to_string(),
            physical_dimension: "uV".to_string(),
            physical_minimum: -500.0,
            physical_maximum: 500.0,
            digital_minimum: -32768,
            digital_maximum: 32767,
            prefiltering: "".to_string(),
            num_samples_per_record: samples_per_record,
        }
    }

    #[test]
    fn test_signal_header_calculations() {
        let header = test_signal_header("Test", 256);
        assert_eq!(header.sample_frequency(1.0), 256.0);

        let gain = header.gain();
        assert!((gain - 0.01526).abs() < 0.001);
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roundtrip.edf");

        let headers = vec![test_signal_header("EEG1", 100), test_signal_header("EEG2", 100)];
        let mut writer =
            EdfWriter::create(&path, "patient", "recording", 1.0, headers).unwrap();

        for record in 0..3 {
            let ch1: Vec<f64> = (0..100).map(|i| (record * 100 + i) as f64 * 0.01).collect();
            let ch2: Vec<f64> = (0..100).map(|i| -((record * 100 + i) as f64) * 0.01).collect();
            writer.write_physical_record(&[ch1, ch2]).unwrap();
        }
        writer.finalize(3).unwrap();

        let reader = EdfReader::open(&path).unwrap();
        let meta = reader.metadata().unwrap();
        assert_eq!(meta.sample_rate, 100.0);
        assert_eq!(meta.num_channels, 2);
        assert_eq!(meta.num_samples, 300);
        assert_eq!(meta.duration, 3.0);
        assert_eq!(meta.channels, vec!["EEG1", "EEG2"]);
        assert_eq!(meta.start_time.as_deref(), Some("2024-01-01T00:00:00"));

        // Window spanning a record boundary
        let window = reader.read_window(90, 20, None).unwrap();
        assert_eq!(window.num_channels(), 2);
        assert_eq!(window.num_samples(), 20);
        for (i, &t) in window.timestamps.iter().enumerate() {
            assert!((t - (90 + i) as f64 / 100.0).abs() < 1e-9);
        }
        // Quantization error is bounded by one digital step
        let step = 1000.0 / 65535.0;
        for i in 0..20 {
            let expected = (90 + i) as f64 * 0.01;
            assert!((window.samples[0][i] - expected).abs() < step);
            assert!((window.samples[1][i] + expected).abs() < step);
        }
    }

    #[test]
    fn test_read_window_clamps_at_eof() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.edf");

        let headers = vec![test_signal_header("EEG1", 50)];
        let mut writer = EdfWriter::create(&path, "p", "r", 1.0, headers).unwrap();
        writer
            .write_physical_record(&[(0..50).map(|i| i as f64).collect()])
            .unwrap();
        writer.finalize(1).unwrap();

        let reader = EdfReader::open(&path).unwrap();
        let window = reader.read_window(40, 50, None).unwrap();
        assert_eq!(window.num_samples(), 10);

        let empty = reader.read_window(50, 50, None).unwrap();
        assert_eq!(empty.num_samples(), 0);
        assert_eq!(empty.num_channels(), 1);
    }

    #[test]
    fn test_channel_selection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("select.edf");

        let headers = vec![test_signal_header("Fp1", 10), test_signal_header("Fp2", 10)];
        let mut writer = EdfWriter::create(&path, "p", "r", 1.0, headers).unwrap();
        writer
            .write_physical_record(&[vec![1.0; 10], vec![2.0; 10]])
            .unwrap();
        writer.finalize(1).unwrap();

        let reader = EdfReader::open(&path).unwrap();
        let window = reader
            .read_window(0, 10, Some(&["Fp2".to_string()]))
            .unwrap();
        assert_eq!(window.num_channels(), 1);
        let step = 1000.0 / 65535.0;
        assert!((window.samples[0][0] - 2.0).abs() < step);
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.edf");
        std::fs::write(&path, b"this is not an edf file at all").unwrap();
        assert!(EdfReader::open(&path).is_err());
    }

    #[test]
    fn test_parse_edf_datetime() {
        assert_eq!(
            parse_edf_datetime("02.03.24", "13.30.05").as_deref(),
            Some("2024-03-02T13:30:05")
        );
        assert_eq!(
            parse_edf_datetime("01.01.85", "00.00.00").as_deref(),
            Some("1985-01-01T00:00:00")
        );
        assert_eq!(parse_edf_datetime("", ""), None);
    }
}
