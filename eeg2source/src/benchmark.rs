//! Comparative benchmarking of the execution backends.
//!
//! [`BenchmarkHarness`] runs each requested backend over each sample file
//! exactly once and reports wall-clock time, peak granted memory, and
//! cache behaviour per (backend, file) pair. Runs are cold by default:
//! every backend gets its own cache directory and its own
//! [`MemoryManager`], so an earlier backend can never warm a later one.
//! A warm pass (one cache shared by all backends, with the result cache
//! enabled) is an explicit option and is reported per row through the
//! cache-hit flag.
//!
//! Files are processed one at a time even under the parallel backend so
//! each row's peak-memory figure is attributable to that file alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{ArtifactCache, CacheError};
use crate::config::{
    format_size, MemorySettings, ProcessingSettings, DEFAULT_CACHE_SIZE, DEFAULT_CLAIM_WAIT_SECS,
};
use crate::errors::ErrorCategory;
use crate::io::reader::FdtPairReader;
use crate::io::writer::{ResultWriter, WriteError};
use crate::kernel::{KernelError, MinimumNormKernel};
use crate::memory::MemoryManager;
use crate::processor::{
    GpuProcessor, Job, JobConfig, JobStatus, ParallelProcessor, Processor, SequentialProcessor,
    StageContext, VariantKind,
};

/// Failure while setting up a benchmark environment. Per-job failures do
/// not surface here; they land in their row's status.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("failed to prepare benchmark scratch space: {0}")]
    Scratch(#[from] std::io::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Runs a fixed workload across backends and collects a report.
pub struct BenchmarkHarness {
    files: Vec<PathBuf>,
    variants: Vec<VariantKind>,
    scratch: PathBuf,
    warm: bool,
    processing: ProcessingSettings,
    memory: MemorySettings,
}

impl BenchmarkHarness {
    /// Harness over `files`, with caches and outputs under `scratch`.
    /// Defaults to the two CPU backends, cold.
    pub fn new(files: Vec<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
        Self {
            files,
            variants: vec![VariantKind::Sequential, VariantKind::Parallel],
            scratch: scratch.into(),
            warm: false,
            processing: ProcessingSettings::default(),
            memory: MemorySettings::default(),
        }
    }

    pub fn with_variants(mut self, variants: Vec<VariantKind>) -> Self {
        self.variants = variants;
        self
    }

    /// Share one cache across all backends and enable the result cache,
    /// so later rows report hits instead of recomputing.
    pub fn with_warm(mut self, warm: bool) -> Self {
        self.warm = warm;
        self
    }

    pub fn with_processing(mut self, processing: ProcessingSettings) -> Self {
        self.processing = processing;
        self
    }

    pub fn with_memory(mut self, memory: MemorySettings) -> Self {
        self.memory = memory;
        self
    }

    /// Run every (backend, file) pair once, in the order given.
    pub async fn run(&self) -> Result<BenchmarkReport, BenchmarkError> {
        let mut rows = Vec::with_capacity(self.variants.len() * self.files.len());
        let shared_cache = if self.warm {
            Some(ArtifactCache::open(self.scratch.join("cache"), DEFAULT_CACHE_SIZE).await?)
        } else {
            None
        };

        for &variant in &self.variants {
            let variant_dir = self.scratch.join(variant.as_str());
            let cache = match &shared_cache {
                Some(shared) => shared.clone(),
                None => ArtifactCache::open(variant_dir.join("cache"), DEFAULT_CACHE_SIZE).await?,
            };
            let memory = Arc::new(MemoryManager::new(self.memory.budget));
            let ctx = StageContext {
                memory: Arc::clone(&memory),
                cache: Some(cache),
                kernel: Arc::new(MinimumNormKernel::new()),
                reader: Arc::new(FdtPairReader::new()),
                writer: Arc::new(ResultWriter::new(variant_dir.join("out"))?),
                default_montage: self.processing.montage.clone(),
                admission_timeout: self.memory.admission_timeout,
                claim_wait: Duration::from_secs(DEFAULT_CLAIM_WAIT_SECS),
            };

            let processor: Arc<dyn Processor> = match variant {
                VariantKind::Sequential => Arc::new(SequentialProcessor::new(ctx)),
                VariantKind::Parallel => {
                    Arc::new(ParallelProcessor::new(ctx, self.processing.workers))
                }
                VariantKind::Gpu => {
                    match GpuProcessor::new(ctx, self.processing.gpu_backend, self.processing.workers)
                    {
                        Ok(gpu) => Arc::new(gpu),
                        Err(err) => {
                            tracing::warn!(error = %err, "gpu backend unavailable, skipping its measurements");
                            for file in &self.files {
                                rows.push(BenchmarkRow::unavailable(variant, file.clone(), &err));
                            }
                            continue;
                        }
                    }
                }
            };

            tracing::info!(backend = %processor.name(), warm = self.warm, "benchmarking backend");
            for file in &self.files {
                memory.reset_peak();
                let job = Job::new(file.clone(), self.job_config(&variant_dir));
                let result = processor.process(&job).await;
                rows.push(BenchmarkRow {
                    variant: processor.name(),
                    file: file.clone(),
                    status: result.status,
                    elapsed: result.duration,
                    peak_bytes: memory.peak(),
                    cache_hit: result.cache.operator_hit == Some(true)
                        || result.cache.result_hit == Some(true),
                    error: result
                        .error
                        .map(|record| format!("{}: {}", record.category, record.message)),
                });
            }
        }

        Ok(BenchmarkReport {
            warm: self.warm,
            rows,
        })
    }

    fn job_config(&self, variant_dir: &Path) -> JobConfig {
        let mut config = JobConfig::new(variant_dir.join("out"))
            .with_resample_hz(self.processing.resample_hz)
            .with_lambda2(self.processing.lambda2)
            .with_chunked(self.memory.chunked);
        config.use_result_cache = self.warm;
        config
    }
}

/// One measured (backend, file) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRow {
    pub variant: String,
    pub file: PathBuf,
    pub status: JobStatus,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
    pub peak_bytes: u64,
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BenchmarkRow {
    /// Row for a backend that could not be constructed at all. Keeps the
    /// report shape at exactly one row per (backend, file) pair.
    fn unavailable(variant: VariantKind, file: PathBuf, err: &KernelError) -> Self {
        Self {
            variant: variant.to_string(),
            file,
            status: JobStatus::Failed,
            elapsed: Duration::ZERO,
            peak_bytes: 0,
            cache_hit: false,
            error: Some(format!("{}: {err}", ErrorCategory::BackendUnavailable)),
        }
    }
}

/// Ordered benchmark rows, backend-major in the order requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub warm: bool,
    pub rows: Vec<BenchmarkRow>,
}

impl BenchmarkReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render as an aligned text table, one line per row.
    pub fn render_table(&self) -> String {
        const HEADERS: [&str; 6] = ["BACKEND", "FILE", "STATUS", "ELAPSED", "PEAK", "CACHE"];

        let cells: Vec<[String; 6]> = self
            .rows
            .iter()
            .map(|row| {
                [
                    row.variant.clone(),
                    row.file
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| row.file.display().to_string()),
                    row.status.to_string(),
                    format_elapsed(row.elapsed),
                    format_size(row.peak_bytes),
                    if row.cache_hit { "hit" } else { "miss" }.to_string(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let mut out = String::new();
        push_row(&mut out, &HEADERS.map(String::from), &widths);
        for row in &cells {
            push_row(&mut out, row, &widths);
        }
        out
    }
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(&format!("{cell:<width$}", width = widths[i]));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

fn format_elapsed(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms >= 10_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{ms}ms")
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::synth;

    const MIB: u64 = 1024 * 1024;

    fn write_sample(dir: &Path, name: &str, seed: u64) -> PathBuf {
        let recording = synth::generate(64, 2, 80, 400.0, Some("biosemi64"), seed);
        let path = dir.join(format!("{name}.set"));
        synth::write_pair(&path, &recording).unwrap();
        path
    }

    #[tokio::test]
    async fn cold_run_yields_one_row_per_backend_and_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = write_sample(dir.path(), "subj-a", 7);
        let b = write_sample(dir.path(), "subj-b", 8);

        let harness = BenchmarkHarness::new(vec![a.clone(), b.clone()], dir.path().join("bench"))
            .with_memory(MemorySettings::default().with_budget(64 * MIB));
        let report = harness.run().await.unwrap();

        assert_eq!(report.rows.len(), 4);
        assert!(report.rows.iter().all(|r| r.status == JobStatus::Succeeded));
        assert!(report.rows.iter().all(|r| r.peak_bytes > 0));

        assert_eq!(report.rows[0].variant, "sequential");
        assert_eq!(report.rows[0].file, a);
        assert_eq!(report.rows[1].file, b);
        assert_eq!(report.rows[2].variant, "parallel");
        assert_eq!(report.rows[3].file, b);

        // Within one backend the second file reuses the operator; across
        // backends a cold run shares nothing.
        assert!(!report.rows[0].cache_hit);
        assert!(report.rows[1].cache_hit);
        assert!(!report.rows[2].cache_hit);
        assert!(report.rows[3].cache_hit);
    }

    #[tokio::test]
    async fn warm_run_shares_the_cache_across_backends() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = write_sample(dir.path(), "subj", 11);

        let harness = BenchmarkHarness::new(vec![file], dir.path().join("bench"))
            .with_warm(true)
            .with_memory(MemorySettings::default().with_budget(64 * MIB));
        let report = harness.run().await.unwrap();

        assert_eq!(report.rows.len(), 2);
        assert!(report.warm);
        assert!(!report.rows[0].cache_hit);
        assert!(report.rows[1].cache_hit);
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn unavailable_backend_still_fills_its_rows() {
        use crate::kernel::gpu::GpuBackendSelect;

        let dir = tempfile::TempDir::new().unwrap();
        let file = write_sample(dir.path(), "subj", 3);

        let harness = BenchmarkHarness::new(vec![file], dir.path().join("bench"))
            .with_variants(vec![VariantKind::Gpu, VariantKind::Sequential])
            .with_processing(ProcessingSettings::default().with_gpu_backend(GpuBackendSelect::Metal))
            .with_memory(MemorySettings::default().with_budget(64 * MIB));
        let report = harness.run().await.unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].variant, "gpu");
        assert_eq!(report.rows[0].status, JobStatus::Failed);
        assert_eq!(report.rows[0].elapsed, Duration::ZERO);
        let note = report.rows[0].error.as_deref().unwrap();
        assert!(note.contains("backend-unavailable"), "note: {note}");
        assert_eq!(report.rows[1].status, JobStatus::Succeeded);
    }

    #[test]
    fn report_renders_aligned_table_and_json() {
        let report = BenchmarkReport {
            warm: false,
            rows: vec![
                BenchmarkRow {
                    variant: "sequential".into(),
                    file: PathBuf::from("/data/subj-a.set"),
                    status: JobStatus::Succeeded,
                    elapsed: Duration::from_millis(42),
                    peak_bytes: 3 * MIB,
                    cache_hit: false,
                    error: None,
                },
                BenchmarkRow {
                    variant: "parallel".into(),
                    file: PathBuf::from("/data/subj-a.set"),
                    status: JobStatus::Failed,
                    elapsed: Duration::from_millis(7),
                    peak_bytes: MIB,
                    cache_hit: false,
                    error: Some("memory-exceeded: admission timed out".into()),
                },
            ],
        };

        let table = report.render_table();
        assert!(table.starts_with("BACKEND"));
        assert!(table.contains("subj-a.set"));
        assert!(table.contains("42ms"));
        assert!(table.contains("3MB"));
        assert!(table.contains("failed"));

        let parsed: BenchmarkReport = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].elapsed, Duration::from_millis(42));
        assert_eq!(parsed.rows[1].error.as_deref(), Some("memory-exceeded: admission timed out"));
    }
}
