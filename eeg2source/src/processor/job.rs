//! Job identity, configuration, and results.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ErrorRecord;
use crate::io::writer::OutputPaths;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    /// Allocate the next id.
    pub fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Per-attempt processing parameters.
///
/// The robust path adjusts these between attempts: a montage-mismatch
/// retry sets `relaxed_montage`, a data-quality retry fills
/// `dropped_channels`, and a memory retry flips `chunked` on.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// Montage override; falls back to the recording header, then the
    /// configured default.
    pub montage: Option<String>,
    pub resample_hz: f64,
    pub lambda2: f64,
    pub output_dir: PathBuf,
    /// Allow epoch-chunked processing when the full estimate cannot be
    /// admitted.
    pub chunked: bool,
    /// Accept a montage re-guessed from the channel count.
    pub relaxed_montage: bool,
    /// Channels to drop before localization (original indices).
    pub dropped_channels: Vec<usize>,
    /// Consult the result cache, not just the operator cache.
    pub use_result_cache: bool,
}

impl JobConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            montage: None,
            resample_hz: crate::config::DEFAULT_RESAMPLE_HZ,
            lambda2: crate::config::DEFAULT_LAMBDA2,
            output_dir: output_dir.into(),
            chunked: false,
            relaxed_montage: false,
            dropped_channels: Vec::new(),
            use_result_cache: true,
        }
    }

    pub fn with_montage(mut self, montage: impl Into<String>) -> Self {
        self.montage = Some(montage.into());
        self
    }

    pub fn with_resample_hz(mut self, hz: f64) -> Self {
        self.resample_hz = hz;
        self
    }

    pub fn with_lambda2(mut self, lambda2: f64) -> Self {
        self.lambda2 = lambda2;
        self
    }

    pub fn with_chunked(mut self, chunked: bool) -> Self {
        self.chunked = chunked;
        self
    }
}

/// One recording to process.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input: PathBuf,
    pub config: JobConfig,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>, config: JobConfig) -> Self {
        Self {
            id: JobId::next(),
            input: input.into(),
            config,
        }
    }

    /// The same job identity with an adjusted configuration. Retries go
    /// through this so every attempt reports under one id.
    pub fn with_config(&self, config: JobConfig) -> Self {
        Self {
            id: self.id,
            input: self.input.clone(),
            config,
        }
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache interaction of a finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUse {
    pub operator_hit: Option<bool>,
    pub result_hit: Option<bool>,
}

/// Terminal report for one job. Every submitted job produces exactly
/// one of these, whatever happened to it.
#[derive(Debug)]
pub struct JobResult {
    pub job_id: JobId,
    pub input: PathBuf,
    pub status: JobStatus,
    /// Backend that produced the terminal outcome, after any fallback.
    pub variant: String,
    pub attempts: u32,
    pub duration: Duration,
    /// Admission estimate of the final attempt, bytes.
    pub estimated_bytes: u64,
    /// Whether degraded chunked processing was used.
    pub chunked: bool,
    pub cache: CacheUse,
    pub output: Option<OutputPaths>,
    pub error: Option<ErrorRecord>,
}

impl JobResult {
    /// Report for a job cancelled before it started.
    pub fn cancelled(job: &Job) -> Self {
        Self {
            job_id: job.id,
            input: job.input.clone(),
            status: JobStatus::Cancelled,
            variant: String::new(),
            attempts: 0,
            duration: Duration::ZERO,
            estimated_bytes: 0,
            chunked: false,
            cache: CacheUse::default(),
            output: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique_and_ordered_for_display() {
        let a = JobId::next();
        let b = JobId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("job-"));
    }

    #[test]
    fn status_round_trips_through_serde() {
        let json = serde_json::to_string(&JobStatus::Retrying).unwrap();
        assert_eq!(json, "\"retrying\"");
        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobStatus::Retrying);
    }

    #[test]
    fn cancelled_result_is_terminal_and_empty() {
        let job = Job::new("/data/sub-01.set", JobConfig::new("/out"));
        let result = JobResult::cancelled(&job);
        assert_eq!(result.status, JobStatus::Cancelled);
        assert_eq!(result.attempts, 0);
        assert!(result.output.is_none());
        assert!(result.error.is_none());
        assert!(!result.is_success());
    }

    #[test]
    fn with_config_preserves_identity() {
        let job = Job::new("/data/sub-01.set", JobConfig::new("/out"));
        let retry = job.with_config(job.config.clone().with_chunked(true));
        assert_eq!(retry.id, job.id);
        assert_eq!(retry.input, job.input);
        assert!(retry.config.chunked);
    }

    #[test]
    fn config_builders_compose() {
        let config = JobConfig::new("/out")
            .with_montage("biosemi64")
            .with_resample_hz(125.0)
            .with_lambda2(0.2)
            .with_chunked(true);
        assert_eq!(config.montage.as_deref(), Some("biosemi64"));
        assert_eq!(config.resample_hz, 125.0);
        assert_eq!(config.lambda2, 0.2);
        assert!(config.chunked);
    }
}
