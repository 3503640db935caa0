//! Persisting localization results.
//!
//! Each processed recording yields two files next to each other in the
//! output directory: `<stem>_atlas_timecourses.npy` with the region
//! time-courses and `<stem>_metadata.json` describing how they were
//! produced. Both are written atomically via temp file + rename so a
//! crashed run never leaves a half-written result that looks complete.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::npy;
use super::tensor::RegionTimeSeries;

/// Suffix for the time-course payload.
pub const TIMECOURSES_SUFFIX: &str = "_atlas_timecourses.npy";
/// Suffix for the metadata sidecar.
pub const METADATA_SUFFIX: &str = "_metadata.json";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write result file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Output file locations for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub timecourses: PathBuf,
    pub metadata: PathBuf,
}

/// Compute the output locations for `input` under `output_dir`.
pub fn output_paths(output_dir: &Path, input: &Path) -> OutputPaths {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());
    OutputPaths {
        timecourses: output_dir.join(format!("{stem}{TIMECOURSES_SUFFIX}")),
        metadata: output_dir.join(format!("{stem}{METADATA_SUFFIX}")),
    }
}

/// Sidecar describing one result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMetadata {
    pub input: PathBuf,
    pub montage: String,
    pub n_regions: usize,
    pub n_epochs: usize,
    pub n_samples: usize,
    pub sfreq_hz: f64,
    pub lambda2: f64,
    pub backend: String,
    pub units: String,
    pub atlas_version: String,
    pub operator_key: String,
    pub created_at: DateTime<Utc>,
}

impl ResultMetadata {
    /// Units of the stored values: current dipole moment.
    pub const UNITS: &'static str = "A⋅m";
    /// Atlas the regions are drawn from.
    pub const ATLAS_VERSION: &'static str = "desikan_killiany_68";
}

/// Writes results into a fixed output directory.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    output_dir: PathBuf,
}

impl ResultWriter {
    /// Create the writer, making the output directory if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, WriteError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persist the time-courses and their sidecar for `input`.
    pub fn write(
        &self,
        input: &Path,
        series: &RegionTimeSeries,
        metadata: &ResultMetadata,
    ) -> Result<OutputPaths, WriteError> {
        let paths = output_paths(&self.output_dir, input);

        let shape = [series.n_regions, series.n_samples, series.n_epochs];
        let payload = npy::to_bytes(&shape, series.samples());
        write_atomic(&paths.timecourses, &payload)?;

        let sidecar = serde_json::to_string_pretty(metadata)?;
        write_atomic(&paths.metadata, sidecar.as_bytes())?;

        tracing::debug!(
            input = %input.display(),
            timecourses = %paths.timecourses.display(),
            "result written"
        );
        Ok(paths)
    }
}

/// Write atomically via temp file + rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, bytes)?;
    std::fs::rename(&temp_path, path)
}
