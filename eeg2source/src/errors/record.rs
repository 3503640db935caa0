//! Persisted error records for permanently failed jobs.
//!
//! Every job that fails after its recovery attempts is written to the error
//! directory as one JSON file, so a batch can be audited after the fact
//! without trawling logs.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::ErrorCategory;

/// Machine-readable record of one permanently failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Failure category after classification.
    pub category: ErrorCategory,
    /// Human-readable description of the underlying error.
    pub message: String,
    /// One-line remediation guidance for this category.
    pub remediation: String,
    /// Identifier of the originating job.
    pub job_id: String,
    /// Input file the job was processing.
    pub input: PathBuf,
    /// Name of the processor variant that last attempted the job.
    pub variant: String,
    /// Total attempts made, including retries and fallbacks.
    pub attempts: u32,
    /// Channels the quality screen flagged, when the failure was a
    /// data-quality one. Feeds the channel-drop retry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flagged_channels: Vec<usize>,
    /// When the job was given up on.
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    /// Build a record for a failure observed now.
    pub fn new(
        category: ErrorCategory,
        message: impl Into<String>,
        job_id: impl Into<String>,
        input: impl Into<PathBuf>,
        variant: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            remediation: category.remediation_hint().to_string(),
            job_id: job_id.into(),
            input: input.into(),
            variant: variant.into(),
            attempts,
            flagged_channels: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// File name this record is persisted under: `<stem>-<jobid>.json`.
    pub fn file_name(&self) -> String {
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        format!("{}-{}.json", sanitize(&stem), sanitize(&self.job_id))
    }
}

/// Replace path-hostile characters so records land as flat files.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes error records into a directory, one JSON file per failed job.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    directory: PathBuf,
}

impl ErrorSink {
    /// Create a sink, ensuring the directory exists.
    pub fn new(directory: impl Into<PathBuf>) -> io::Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// Directory records are written into.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Persist one record; returns the path written.
    pub fn write(&self, record: &ErrorRecord) -> io::Result<PathBuf> {
        let path = self.directory.join(record.file_name());
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, json)?;
        tracing::debug!(
            category = %record.category,
            input = %record.input.display(),
            path = %path.display(),
            "persisted error record"
        );
        Ok(path)
    }

    /// Load every record in the directory, skipping unreadable files.
    pub fn load_all(&self) -> io::Result<Vec<ErrorRecord>> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<ErrorRecord>(&s).map_err(|e| e.to_string()))
            {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable error record");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ErrorRecord {
        ErrorRecord::new(
            ErrorCategory::FormatError,
            "header truncated at byte 12",
            "job-7",
            "/data/sub-01_epochs.set",
            "parallel",
            1,
        )
    }

    #[test]
    fn record_carries_hint_for_category() {
        let record = sample_record();
        assert_eq!(
            record.remediation,
            ErrorCategory::FormatError.remediation_hint()
        );
    }

    #[test]
    fn file_name_joins_stem_and_job_id() {
        let record = sample_record();
        assert_eq!(record.file_name(), "sub-01_epochs-job-7.json");
    }

    #[test]
    fn file_name_sanitizes_hostile_characters() {
        let mut record = sample_record();
        record.input = PathBuf::from("/data/weird name?.set");
        assert_eq!(record.file_name(), "weird_name_-job-7.json");
    }

    #[test]
    fn flagged_channels_serialize_only_when_present() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("flagged_channels"));

        let mut flagged = sample_record();
        flagged.flagged_channels = vec![3, 17];
        let json = serde_json::to_string(&flagged).unwrap();
        let back: ErrorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.flagged_channels, vec![3, 17]);
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = ErrorSink::new(dir.path().join("errors")).unwrap();

        let record = sample_record();
        let path = sink.write(&record).unwrap();
        assert!(path.exists());

        let loaded = sink.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].category, ErrorCategory::FormatError);
        assert_eq!(loaded[0].job_id, "job-7");
        assert_eq!(loaded[0].attempts, 1);
    }

    #[test]
    fn load_all_skips_junk_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = ErrorSink::new(dir.path()).unwrap();
        sink.write(&sample_record()).unwrap();
        std::fs::write(dir.path().join("not-a-record.json"), "{broken").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let loaded = sink.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
