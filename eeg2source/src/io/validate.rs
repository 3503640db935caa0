//! Pre-flight validation of recordings without processing them.
//!
//! Mirrors the checks the reader and quality screen apply during a run:
//! header and companion presence, promised-versus-actual payload size,
//! dimension sanity, and the flat/extreme channel scan. The payload is
//! streamed in epoch batches, so validating a recording never needs the
//! memory a full load would.

use std::path::{Path, PathBuf};

use super::quality::{ChannelScan, QualityReport};
use super::reader::{RecordingMeta, RecordingReader};

/// Epochs per streamed scan batch.
const SCAN_EPOCHS: usize = 16;

/// Per-file outcome of validation.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub input: PathBuf,
    pub outcome: ValidationOutcome,
}

#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// The recording is readable; quality findings attached.
    Readable {
        meta: RecordingMeta,
        quality: QualityReport,
    },
    /// The reader rejected the file.
    Unreadable { reason: String },
}

impl ValidationReport {
    /// True when the recording is readable and the quality screen found
    /// nothing. Flagged channels are findings, not hard failures, but a
    /// screening pass should surface them as a non-passing result.
    pub fn passed(&self) -> bool {
        match &self.outcome {
            ValidationOutcome::Readable { quality, .. } => quality.is_clean(),
            ValidationOutcome::Unreadable { .. } => false,
        }
    }
}

/// Validate one recording.
pub fn validate_file(reader: &dyn RecordingReader, path: &Path) -> ValidationReport {
    let input = path.to_path_buf();
    let outcome = match scan_recording(reader, path) {
        Ok((meta, quality)) => ValidationOutcome::Readable { meta, quality },
        Err(reason) => ValidationOutcome::Unreadable { reason },
    };
    ValidationReport { input, outcome }
}

fn scan_recording(
    reader: &dyn RecordingReader,
    path: &Path,
) -> Result<(RecordingMeta, QualityReport), String> {
    let meta = reader.probe(path).map_err(|e| e.to_string())?;

    let mut scan = ChannelScan::new(meta.n_channels);
    let mut epoch = 0;
    while epoch < meta.n_epochs {
        let count = SCAN_EPOCHS.min(meta.n_epochs - epoch);
        let chunk = reader
            .load_epoch_range(&meta, epoch, count)
            .map_err(|e| e.to_string())?;
        scan.update(&chunk);
        epoch += count;
    }

    Ok((meta, scan.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reader::FdtPairReader;
    use crate::io::synth;

    #[test]
    fn clean_recording_passes() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = dir.path().join("clean.set");
        let recording = synth::generate(8, 40, 64, 250.0, Some("biosemi64"), 5);
        synth::write_pair(&set, &recording).unwrap();

        let report = validate_file(&FdtPairReader::new(), &set);
        assert!(report.passed());
        match report.outcome {
            ValidationOutcome::Readable { meta, quality } => {
                assert_eq!(meta.n_channels, 8);
                assert_eq!(meta.n_epochs, 40);
                assert!(quality.is_clean());
            }
            other => panic!("expected readable outcome, got {other:?}"),
        }
    }

    #[test]
    fn flat_channel_is_flagged_across_batches() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = dir.path().join("flat.set");
        // More epochs than one scan batch so the flat channel must stay
        // flat through the streamed updates.
        let mut recording = synth::generate(4, 40, 32, 250.0, None, 9);
        let (n_channels, n_epochs, n_samples, sfreq_hz) = (
            recording.tensor.n_channels,
            recording.tensor.n_epochs,
            recording.tensor.n_samples,
            recording.tensor.sfreq_hz,
        );
        let mut data = recording.tensor.samples().to_vec();
        for epoch in 0..n_epochs {
            let base = (epoch * n_channels + 2) * n_samples;
            data[base..base + n_samples].fill(1e-6);
        }
        recording.tensor =
            crate::io::tensor::EpochTensor::from_vec(n_channels, n_epochs, n_samples, sfreq_hz, data)
                .unwrap();
        synth::write_pair(&set, &recording).unwrap();

        let report = validate_file(&FdtPairReader::new(), &set);
        assert!(!report.passed());
        match report.outcome {
            ValidationOutcome::Readable { quality, .. } => {
                assert_eq!(quality.flat_channels, vec![2]);
                assert!(quality.extreme_channels.is_empty());
            }
            other => panic!("expected readable outcome, got {other:?}"),
        }
    }

    #[test]
    fn missing_companion_is_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = dir.path().join("orphan.set");
        std::fs::write(
            &set,
            r#"{"n_channels": 2, "n_epochs": 1, "n_samples": 8, "sfreq_hz": 250.0}"#,
        )
        .unwrap();

        let report = validate_file(&FdtPairReader::new(), &set);
        assert!(!report.passed());
        match report.outcome {
            ValidationOutcome::Unreadable { reason } => {
                assert!(reason.contains("companion"), "reason: {reason}");
            }
            other => panic!("expected unreadable outcome, got {other:?}"),
        }
    }
}
