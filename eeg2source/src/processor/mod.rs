//! Processing backends.
//!
//! Three interchangeable backends localize recordings through the same
//! pipeline:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Processor (trait)                       │
//! │        process(Job) -> JobResult, parallelism()          │
//! ├──────────────┬───────────────────┬───────────────────────┤
//! │ Sequential   │ Parallel          │ Gpu                   │
//! │ one job at a │ worker-pool batch │ device-queue kernel   │
//! │ time         │ concurrency       │ launches, 4x memory   │
//! └──────────────┴───────────────────┴───────────────────────┘
//!                          │
//!                   stages::run_job
//!        admission → load → clean → operator → apply → write
//! ```
//!
//! The backends differ only in batch-level parallelism, memory estimate
//! multiplier, and where the kernel product runs; the per-job pipeline
//! in [`stages`] is shared. Recovery (retries, backend fallback) sits a
//! layer above, in [`crate::robust`].

mod error;
mod gpu;
mod job;
mod parallel;
mod sequential;
mod stages;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use crate::memory::{CPU_WORKSPACE_MULTIPLIER, GPU_WORKSPACE_MULTIPLIER};

pub use error::ProcessError;
pub use gpu::GpuProcessor;
pub use job::{CacheUse, Job, JobConfig, JobId, JobResult, JobStatus};
pub use parallel::ParallelProcessor;
pub use sequential::SequentialProcessor;
pub use stages::{StageContext, StageOutput};

/// Which processing backend a job runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Sequential,
    Parallel,
    Gpu,
}

impl VariantKind {
    /// Stable machine-readable name, as used in config files, results,
    /// and benchmark reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Sequential => "sequential",
            VariantKind::Parallel => "parallel",
            VariantKind::Gpu => "gpu",
        }
    }

    /// All variants, in benchmark display order.
    pub fn all() -> [VariantKind; 3] {
        [
            VariantKind::Sequential,
            VariantKind::Parallel,
            VariantKind::Gpu,
        ]
    }

    /// Memory estimate multiplier for this backend.
    pub fn memory_multiplier(&self) -> f64 {
        match self {
            VariantKind::Gpu => GPU_WORKSPACE_MULTIPLIER,
            _ => CPU_WORKSPACE_MULTIPLIER,
        }
    }

    /// Next backend in the degradation chain, most to least capable:
    /// gpu → parallel → sequential → (give up).
    pub fn fallback(&self) -> Option<VariantKind> {
        match self {
            VariantKind::Gpu => Some(VariantKind::Parallel),
            VariantKind::Parallel => Some(VariantKind::Sequential),
            VariantKind::Sequential => None,
        }
    }
}

impl FromStr for VariantKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(VariantKind::Sequential),
            "parallel" => Ok(VariantKind::Parallel),
            "gpu" => Ok(VariantKind::Gpu),
            other => Err(format!(
                "unknown backend \"{other}\" (expected sequential, parallel, or gpu)"
            )),
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A processing backend.
///
/// `process` always resolves to a [`JobResult`]; errors are folded into
/// the result rather than surfaced as `Err`, so batch drivers handle
/// success and failure through one path.
pub trait Processor: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> VariantKind;

    /// Human-readable backend label, including accelerator details
    /// where relevant (e.g. `gpu(cuda)`).
    fn name(&self) -> String {
        self.kind().to_string()
    }

    /// How many jobs a batch driver should run concurrently on this
    /// backend.
    fn parallelism(&self) -> usize;

    /// Process one recording end to end.
    fn process<'a>(
        &'a self,
        job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = JobResult> + Send + 'a>>;
}
