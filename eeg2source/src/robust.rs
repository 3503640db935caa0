//! Failure classification, one-shot retries, and backend fallback.
//!
//! [`RobustProcessor`] decorates any [`Processor`]. A failed attempt is
//! classified by its [`ErrorCategory`] and recovered per category:
//!
//! | category            | recovery                                        |
//! |---------------------|-------------------------------------------------|
//! | format-error        | none, permanent                                 |
//! | montage-mismatch    | retry with the montage re-guessed from the data |
//! | data-quality        | retry with the flagged channels excluded        |
//! | memory-exceeded     | retry in chunked degraded mode                  |
//! | backend-unavailable | one attempt on the next backend in the chain    |
//! | unknown             | none, permanent                                 |
//!
//! Each category is granted at most one retry per job, and a retry only
//! happens when the adjustment actually changes the configuration — a
//! job that already ran chunked cannot loop on memory-exceeded. Retries
//! re-run under the same job id; attempt counts accumulate into the
//! final [`JobResult`] and its error record. A permanent failure never
//! stops the surrounding batch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::ErrorCategory;
use crate::kernel::GpuBackendSelect;
use crate::processor::{
    GpuProcessor, Job, JobConfig, JobResult, ParallelProcessor, Processor, SequentialProcessor,
    StageContext, VariantKind,
};

/// Which per-category retries are enabled. Fallback on
/// backend-unavailable is always on; it is shaped by the chain instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry montage mismatches with relaxed montage inference.
    pub relaxed_montage: bool,
    /// Retry data-quality failures with flagged channels excluded.
    pub clean_channels: bool,
    /// Retry memory-exceeded failures in chunked mode.
    pub chunked_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            relaxed_montage: true,
            clean_channels: true,
            chunked_retry: true,
        }
    }
}

/// What to do with a failed attempt.
enum Decision {
    Retry(&'static str),
    Fallback,
    Fail,
}

/// Categories that have used their retry for the current job.
#[derive(Default)]
struct Retried {
    montage: bool,
    quality: bool,
    memory: bool,
}

/// Decorates a processor with the recovery policy.
pub struct RobustProcessor {
    primary: Arc<dyn Processor>,
    fallbacks: Vec<Arc<dyn Processor>>,
    policy: RetryPolicy,
}

impl RobustProcessor {
    pub fn new(primary: Arc<dyn Processor>, policy: RetryPolicy) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
            policy,
        }
    }

    /// Backends tried, in order, when an attempt fails
    /// backend-unavailable.
    pub fn with_fallbacks(mut self, fallbacks: Vec<Arc<dyn Processor>>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Build the standard chain for `backend`: the backend itself, then
    /// its degradation chain (gpu → parallel → sequential). A GPU
    /// backend with no usable device is skipped at construction with a
    /// warning, so the chain starts at the first backend that can run.
    pub fn for_backend(
        ctx: &StageContext,
        backend: VariantKind,
        workers: usize,
        gpu: GpuBackendSelect,
        policy: RetryPolicy,
    ) -> Self {
        let mut chain: Vec<Arc<dyn Processor>> = Vec::new();
        let mut kind = Some(backend);
        while let Some(k) = kind {
            match k {
                VariantKind::Sequential => {
                    chain.push(Arc::new(SequentialProcessor::new(ctx.clone())));
                }
                VariantKind::Parallel => {
                    chain.push(Arc::new(ParallelProcessor::new(ctx.clone(), workers)));
                }
                VariantKind::Gpu => match GpuProcessor::new(ctx.clone(), gpu, workers) {
                    Ok(p) => chain.push(Arc::new(p)),
                    Err(err) => {
                        tracing::warn!(error = %err, "gpu unavailable, starting from fallback");
                    }
                },
            }
            kind = k.fallback();
        }

        let mut chain = chain.into_iter();
        let primary = chain
            .next()
            .expect("degradation chain always ends at a cpu backend");
        Self {
            primary,
            fallbacks: chain.collect(),
            policy,
        }
    }

    fn backend(&self, level: usize) -> &Arc<dyn Processor> {
        if level == 0 {
            &self.primary
        } else {
            &self.fallbacks[level - 1]
        }
    }

    fn chain_len(&self) -> usize {
        1 + self.fallbacks.len()
    }

    async fn run(&self, job: &Job) -> JobResult {
        let mut level = 0;
        let mut config = job.config.clone();
        let mut retried = Retried::default();
        let mut attempts: u32 = 0;

        loop {
            let attempt = job.with_config(config.clone());
            let mut result = self.backend(level).process(&attempt).await;
            attempts += result.attempts.max(1);

            if result.is_success() {
                result.attempts = attempts;
                return result;
            }

            match self.decide(&result, &mut config, &mut retried, level) {
                Decision::Fail => {
                    result.attempts = attempts;
                    if let Some(record) = result.error.as_mut() {
                        record.attempts = attempts;
                    }
                    return result;
                }
                Decision::Retry(adjustment) => {
                    tracing::info!(
                        job = %job.id,
                        backend = %self.backend(level).name(),
                        attempts,
                        adjustment,
                        "retrying failed job"
                    );
                }
                Decision::Fallback => {
                    level += 1;
                    tracing::info!(
                        job = %job.id,
                        backend = %self.backend(level).name(),
                        attempts,
                        "falling back to next backend"
                    );
                }
            }
        }
    }

    fn decide(
        &self,
        result: &JobResult,
        config: &mut JobConfig,
        retried: &mut Retried,
        level: usize,
    ) -> Decision {
        let Some(record) = result.error.as_ref() else {
            return Decision::Fail;
        };

        match record.category {
            ErrorCategory::FormatError | ErrorCategory::Unknown => Decision::Fail,

            ErrorCategory::MontageMismatch => {
                if !self.policy.relaxed_montage || retried.montage || config.relaxed_montage {
                    return Decision::Fail;
                }
                retried.montage = true;
                config.relaxed_montage = true;
                Decision::Retry("relaxed montage inference")
            }

            ErrorCategory::DataQuality => {
                if !self.policy.clean_channels || retried.quality {
                    return Decision::Fail;
                }
                let mut merged = config.dropped_channels.clone();
                merged.sort_unstable();
                merged.dedup();
                let before = merged.len();
                merged.extend(record.flagged_channels.iter().copied());
                merged.sort_unstable();
                merged.dedup();
                if merged.len() == before {
                    // No new channel to exclude; the retry would repeat
                    // the same failure.
                    return Decision::Fail;
                }
                retried.quality = true;
                config.dropped_channels = merged;
                Decision::Retry("excluding flagged channels")
            }

            ErrorCategory::MemoryExceeded => {
                if !self.policy.chunked_retry || retried.memory || config.chunked {
                    return Decision::Fail;
                }
                retried.memory = true;
                config.chunked = true;
                Decision::Retry("chunked degraded mode")
            }

            ErrorCategory::BackendUnavailable => {
                if level + 1 < self.chain_len() {
                    Decision::Fallback
                } else {
                    Decision::Fail
                }
            }
        }
    }
}

impl Processor for RobustProcessor {
    fn kind(&self) -> VariantKind {
        self.primary.kind()
    }

    fn name(&self) -> String {
        format!("robust({})", self.primary.name())
    }

    fn parallelism(&self) -> usize {
        self.primary.parallelism()
    }

    fn process<'a>(
        &'a self,
        job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = JobResult> + Send + 'a>> {
        Box::pin(self.run(job))
    }
}
