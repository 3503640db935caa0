//! Batch execution over a set of jobs.
//!
//! [`BatchRunner`] drives one processor over many jobs with bounded
//! concurrency (the processor's own [`Processor::parallelism`]), and
//! guarantees the accounting invariant: every submitted job yields
//! exactly one [`JobResult`], whatever happens to it. A job whose task
//! panics is folded into a failed result with the unknown category
//! rather than lost, and a cancelled batch reports every unstarted job
//! as cancelled.
//!
//! Cancellation stops jobs that have not begun; in-flight jobs run to
//! completion so their grants, claims, and partially written outputs
//! wind down cleanly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::errors::{ErrorCategory, ErrorRecord, ErrorSink};
use crate::processor::{CacheUse, Job, JobId, JobResult, JobStatus, Processor};

/// Runs batches of jobs against one processor.
pub struct BatchRunner {
    processor: Arc<dyn Processor>,
    errors: Option<ErrorSink>,
    token: CancellationToken,
}

impl BatchRunner {
    pub fn new(processor: Arc<dyn Processor>) -> Self {
        Self {
            processor,
            errors: None,
            token: CancellationToken::new(),
        }
    }

    /// Persist the error record of every permanently failed job.
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.errors = Some(sink);
        self
    }

    /// Handle for cancelling the batch from outside, e.g. a ctrl-c
    /// handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run every job to a result and summarize.
    pub async fn run(&self, jobs: Vec<Job>) -> BatchSummary {
        let started = Instant::now();
        let workers = self.processor.parallelism().max(1);
        let total = jobs.len();
        tracing::info!(total, workers, backend = %self.processor.name(), "batch started");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(total);
        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let processor = Arc::clone(&self.processor);
            let token = self.token.clone();
            let descriptor = (job.id, job.input.clone());
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("batch semaphore closed");
                if token.is_cancelled() {
                    tracing::info!(job = %job.id, "job cancelled before start");
                    return JobResult::cancelled(&job);
                }
                processor.process(&job).await
            });
            handles.push((descriptor, handle));
        }

        let mut results = Vec::with_capacity(total);
        for ((job_id, input), handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::error!(job = %job_id, error = %err, "job task aborted");
                    results.push(aborted_result(job_id, input, self.processor.name(), &err));
                }
            }
        }

        if let Some(sink) = &self.errors {
            for result in &results {
                if result.status != JobStatus::Failed {
                    continue;
                }
                if let Some(record) = &result.error {
                    if let Err(err) = sink.write(record) {
                        tracing::warn!(
                            input = %result.input.display(),
                            error = %err,
                            "failed to persist error record"
                        );
                    }
                }
            }
        }

        let summary = BatchSummary::from_results(results, started.elapsed());
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "batch complete"
        );
        summary
    }
}

/// Result for a job whose task died instead of returning.
fn aborted_result(job_id: JobId, input: PathBuf, variant: String, err: &JoinError) -> JobResult {
    let record = ErrorRecord::new(
        ErrorCategory::Unknown,
        format!("job task aborted: {err}"),
        job_id.to_string(),
        input.clone(),
        &variant,
        1,
    );
    JobResult {
        job_id,
        input,
        status: JobStatus::Failed,
        variant,
        attempts: 1,
        duration: Duration::ZERO,
        estimated_bytes: 0,
        chunked: false,
        cache: CacheUse::default(),
        output: None,
        error: Some(record),
    }
}

/// Accounting for one finished batch.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub operator_cache_hits: usize,
    pub result_cache_hits: usize,
    pub elapsed: Duration,
    /// One result per submitted job, in submission order.
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    fn from_results(results: Vec<JobResult>, elapsed: Duration) -> Self {
        let mut summary = Self {
            total: results.len(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            operator_cache_hits: 0,
            result_cache_hits: 0,
            elapsed,
            results,
        };
        for result in &summary.results {
            match result.status {
                JobStatus::Succeeded => summary.succeeded += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
                _ => summary.failed += 1,
            }
            if result.cache.operator_hit == Some(true) {
                summary.operator_cache_hits += 1;
            }
            if result.cache.result_hit == Some(true) {
                summary.result_cache_hits += 1;
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }

    /// Process exit code: zero only when every job succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }

    /// Permanently failed jobs, in submission order.
    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results
            .iter()
            .filter(|r| r.status == JobStatus::Failed)
    }
}
