//! Loading epoched recordings from `.set`/`.fdt` pairs.
//!
//! The supported container is the raw epoched pair layout: a small JSON
//! header (`<stem>.set`) describing dimensions, sampling rate, and montage,
//! next to a companion `<stem>.fdt` holding little-endian `f32` samples in
//! (epoch, channel, sample) order. MAT-encoded `.set` headers from legacy
//! exporters are detected by magic and rejected as unsupported — full
//! container parsing belongs to the upstream tooling, not this engine.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::tensor::EpochTensor;

/// Companion size must be within this ratio of the header's promise.
const SIZE_TOLERANCE: f64 = 0.1;

/// Errors loading a recording.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("recording not found: {path}")]
    NotFound { path: PathBuf },

    #[error("missing companion data file: {path}")]
    MissingCompanion { path: PathBuf },

    #[error("unsupported .set header in {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("malformed .set header in {path}: {reason}")]
    HeaderParse { path: PathBuf, reason: String },

    #[error("invalid dimensions in {path}: {reason}")]
    BadDimensions { path: PathBuf, reason: String },

    #[error("companion size mismatch for {path}: header promises {expected} bytes, file has {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("i/o error reading recording: {0}")]
    Io(#[from] std::io::Error),
}

/// Header and dimensions of a recording, read without touching the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingMeta {
    pub source: PathBuf,
    pub n_channels: usize,
    pub n_epochs: usize,
    pub n_samples: usize,
    pub sfreq_hz: f64,
    /// Montage declared by the header, if any.
    pub montage: Option<String>,
}

impl RecordingMeta {
    /// Payload size the header promises, in bytes.
    pub fn sample_bytes(&self) -> u64 {
        (self.n_channels * self.n_epochs * self.n_samples * 4) as u64
    }

    /// Bytes one epoch occupies on disk.
    pub fn epoch_bytes(&self) -> u64 {
        (self.n_channels * self.n_samples * 4) as u64
    }
}

/// A fully loaded recording.
#[derive(Debug, Clone)]
pub struct Recording {
    pub meta: RecordingMeta,
    pub tensor: EpochTensor,
}

/// Source of epoched recordings.
///
/// The engine only ever goes through this trait, so tests can substitute
/// in-memory readers and a future vendor-format reader slots in without
/// touching the pipeline.
pub trait RecordingReader: Send + Sync + 'static {
    /// Reader name for logging.
    fn name(&self) -> &str;

    /// Read the header only.
    fn probe(&self, path: &Path) -> Result<RecordingMeta, ReadError>;

    /// Load the whole recording.
    fn load(&self, path: &Path) -> Result<Recording, ReadError>;

    /// Load `count` epochs starting at `start_epoch`.
    ///
    /// Chunked processing streams the payload in epoch sub-batches instead
    /// of materializing the whole tensor.
    fn load_epoch_range(
        &self,
        meta: &RecordingMeta,
        start_epoch: usize,
        count: usize,
    ) -> Result<EpochTensor, ReadError>;
}

/// JSON shape of the `.set` header.
#[derive(Debug, Deserialize)]
struct SetHeader {
    n_channels: usize,
    n_epochs: usize,
    n_samples: usize,
    sfreq_hz: f64,
    #[serde(default)]
    montage: Option<String>,
}

/// Reader for the raw epoched `.set`/`.fdt` pair layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FdtPairReader;

impl FdtPairReader {
    pub fn new() -> Self {
        Self
    }

    fn read_header(&self, path: &Path) -> Result<SetHeader, ReadError> {
        if !path.exists() {
            return Err(ReadError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let bytes = std::fs::read(path)?;
        if bytes.starts_with(b"MATLAB") || bytes.starts_with(b"\x89HDF") {
            return Err(ReadError::Unsupported {
                path: path.to_path_buf(),
                reason: "MAT-encoded header; re-export with the raw pair tooling".to_string(),
            });
        }

        let header: SetHeader =
            serde_json::from_slice(&bytes).map_err(|e| ReadError::HeaderParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if header.n_channels == 0 || header.n_epochs == 0 || header.n_samples == 0 {
            return Err(ReadError::BadDimensions {
                path: path.to_path_buf(),
                reason: format!(
                    "{}ch x {}ep x {}sa",
                    header.n_channels, header.n_epochs, header.n_samples
                ),
            });
        }
        if !(header.sfreq_hz > 0.0) {
            return Err(ReadError::BadDimensions {
                path: path.to_path_buf(),
                reason: format!("non-positive sampling rate {}", header.sfreq_hz),
            });
        }

        Ok(header)
    }

    /// Check the companion exists and its size agrees with the header.
    fn check_companion(&self, meta: &RecordingMeta) -> Result<PathBuf, ReadError> {
        let fdt = companion_path(&meta.source);
        if !fdt.exists() {
            return Err(ReadError::MissingCompanion { path: fdt });
        }

        let expected = meta.sample_bytes();
        let actual = std::fs::metadata(&fdt)?.len();
        let ratio = actual as f64 / expected as f64;
        if (ratio - 1.0).abs() > SIZE_TOLERANCE {
            return Err(ReadError::SizeMismatch {
                path: fdt,
                expected,
                actual,
            });
        }
        Ok(fdt)
    }
}

impl RecordingReader for FdtPairReader {
    fn name(&self) -> &str {
        "fdt-pair"
    }

    fn probe(&self, path: &Path) -> Result<RecordingMeta, ReadError> {
        let header = self.read_header(path)?;
        let meta = RecordingMeta {
            source: path.to_path_buf(),
            n_channels: header.n_channels,
            n_epochs: header.n_epochs,
            n_samples: header.n_samples,
            sfreq_hz: header.sfreq_hz,
            montage: header.montage,
        };
        self.check_companion(&meta)?;
        Ok(meta)
    }

    fn load(&self, path: &Path) -> Result<Recording, ReadError> {
        let meta = self.probe(path)?;
        let tensor = self.load_epoch_range(&meta, 0, meta.n_epochs)?;
        Ok(Recording { meta, tensor })
    }

    fn load_epoch_range(
        &self,
        meta: &RecordingMeta,
        start_epoch: usize,
        count: usize,
    ) -> Result<EpochTensor, ReadError> {
        debug_assert!(start_epoch + count <= meta.n_epochs);

        let fdt = self.check_companion(meta)?;
        let mut file = File::open(&fdt)?;
        file.seek(SeekFrom::Start(start_epoch as u64 * meta.epoch_bytes()))?;

        let value_count = count * meta.n_channels * meta.n_samples;
        let mut raw = vec![0u8; value_count * 4];
        file.read_exact(&mut raw).map_err(|_| ReadError::SizeMismatch {
            path: fdt.clone(),
            expected: meta.sample_bytes(),
            actual: std::fs::metadata(&fdt).map(|m| m.len()).unwrap_or(0),
        })?;

        let mut data = Vec::with_capacity(value_count);
        for chunk in raw.chunks_exact(4) {
            data.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        EpochTensor::from_vec(meta.n_channels, count, meta.n_samples, meta.sfreq_hz, data)
            .map_err(|e| ReadError::BadDimensions {
                path: fdt,
                reason: e.to_string(),
            })
    }
}

/// Companion `.fdt` path for a `.set` header path.
pub fn companion_path(set_path: &Path) -> PathBuf {
    set_path.with_extension("fdt")
}
