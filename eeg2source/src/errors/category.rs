//! Failure taxonomy for per-job error classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of failure categories a job can land in.
///
/// Every error raised while processing a recording is classified into
/// exactly one of these; the recovery policy (retry, fallback, give up)
/// is decided per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Unreadable or malformed input file.
    FormatError,
    /// Electrode layout disagrees with the configured montage.
    MontageMismatch,
    /// Signal anomalies: flat channels, extreme amplitudes, ill-conditioned data.
    DataQuality,
    /// Memory admission denied or timed out.
    MemoryExceeded,
    /// No usable accelerator backend.
    BackendUnavailable,
    /// Anything that matched no other rule.
    Unknown,
}

impl ErrorCategory {
    /// Stable machine-readable name, as persisted in error records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::FormatError => "format-error",
            ErrorCategory::MontageMismatch => "montage-mismatch",
            ErrorCategory::DataQuality => "data-quality",
            ErrorCategory::MemoryExceeded => "memory-exceeded",
            ErrorCategory::BackendUnavailable => "backend-unavailable",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// One-line guidance shown to the user alongside a permanent failure.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            ErrorCategory::FormatError => {
                "check that the file is a valid epoched .set/.fdt pair and the companion data file is present"
            }
            ErrorCategory::MontageMismatch => {
                "verify --montage matches the recording's electrode layout, or leave relaxed montage inference enabled"
            }
            ErrorCategory::DataQuality => {
                "inspect the flagged channels; channel cleaning can exclude them on retry"
            }
            ErrorCategory::MemoryExceeded => {
                "raise --max-memory or enable --chunked processing"
            }
            ErrorCategory::BackendUnavailable => {
                "no usable accelerator was found; select --backend parallel or sequential"
            }
            ErrorCategory::Unknown => {
                "re-run with --log-level debug and inspect the log for the underlying failure"
            }
        }
    }

    /// Whether the robust wrapper attempts a single retry for this category.
    ///
    /// The retry may be suppressed by configuration; this is the ceiling,
    /// not a promise.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorCategory::FormatError | ErrorCategory::Unknown)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
