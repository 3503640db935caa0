//! Pipeline failure type and its classification.

use thiserror::Error;

use crate::cache::CacheError;
use crate::errors::{ErrorCategory, ErrorRecord};
use crate::io::quality::QualityReport;
use crate::io::reader::ReadError;
use crate::io::writer::WriteError;
use crate::kernel::KernelError;
use crate::memory::MemoryError;
use crate::processor::job::Job;

/// Any failure raised while processing one recording.
///
/// The source error is kept intact for logging; [`ProcessError::category`]
/// collapses it to the category the recovery policy keys on.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("quality screening failed: {report}")]
    Quality { report: QualityReport },

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("artifact cache failure: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to write outputs: {0}")]
    Write(#[from] WriteError),
}

impl ProcessError {
    /// Classify into the failure taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProcessError::Read(_) => ErrorCategory::FormatError,
            ProcessError::Quality { .. } => ErrorCategory::DataQuality,
            ProcessError::Kernel(kernel) => match kernel {
                KernelError::UnknownMontage { .. } | KernelError::MontageMismatch { .. } => {
                    ErrorCategory::MontageMismatch
                }
                KernelError::IllConditioned { .. } => ErrorCategory::DataQuality,
                KernelError::BackendUnavailable { .. } => ErrorCategory::BackendUnavailable,
            },
            ProcessError::Memory(_) => ErrorCategory::MemoryExceeded,
            ProcessError::Cache(_) | ProcessError::Write(_) => ErrorCategory::Unknown,
        }
    }

    /// The quality report behind a data-quality failure, when one exists.
    /// Channel-cleaning retries read the offender list from here.
    pub fn quality_report(&self) -> Option<&QualityReport> {
        match self {
            ProcessError::Quality { report } => Some(report),
            _ => None,
        }
    }

    /// Fold into a persistable record for `job` as attempted by `variant`.
    pub fn to_record(&self, job: &Job, variant: &str, attempts: u32) -> ErrorRecord {
        let mut record = ErrorRecord::new(
            self.category(),
            self.to_string(),
            job.id.to_string(),
            job.input.clone(),
            variant,
            attempts,
        );
        if let Some(report) = self.quality_report() {
            record.flagged_channels = report.offending_channels();
        }
        record
    }
}
