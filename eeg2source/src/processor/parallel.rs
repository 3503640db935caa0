//! Parallel backend: the same pipeline with several jobs in flight.
//!
//! Parallelism lives at the batch level; a single job is processed
//! exactly as the sequential backend would. Memory admission keeps the
//! combined working sets inside the budget no matter how many workers
//! the batch driver spins up.

use std::future::Future;
use std::pin::Pin;

use super::stages::{self, ExecParams, StageContext};
use super::{Job, JobResult, Processor, VariantKind};

pub struct ParallelProcessor {
    ctx: StageContext,
    exec: ExecParams,
    workers: usize,
}

impl ParallelProcessor {
    /// `workers` is clamped to at least one.
    pub fn new(ctx: StageContext, workers: usize) -> Self {
        Self {
            ctx,
            workers: workers.max(1),
            exec: ExecParams {
                kind: VariantKind::Parallel,
                label: VariantKind::Parallel.to_string(),
                device: None,
            },
        }
    }
}

impl Processor for ParallelProcessor {
    fn kind(&self) -> VariantKind {
        VariantKind::Parallel
    }

    fn parallelism(&self) -> usize {
        self.workers
    }

    fn process<'a>(
        &'a self,
        job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = JobResult> + Send + 'a>> {
        Box::pin(stages::execute(&self.ctx, &self.exec, job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reader::FdtPairReader;
    use crate::io::synth;
    use crate::io::writer::ResultWriter;
    use crate::kernel::MinimumNormKernel;
    use crate::memory::MemoryManager;
    use crate::processor::JobConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(dir: &std::path::Path) -> StageContext {
        StageContext {
            memory: Arc::new(MemoryManager::new(256 * 1024 * 1024)),
            cache: None,
            kernel: Arc::new(MinimumNormKernel::new()),
            reader: Arc::new(FdtPairReader::new()),
            writer: Arc::new(ResultWriter::new(dir.join("out")).unwrap()),
            default_montage: "biosemi64".to_string(),
            admission_timeout: Duration::from_secs(5),
            claim_wait: Duration::from_secs(5),
        }
    }

    #[test]
    fn worker_count_is_clamped() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(dir.path());
        assert_eq!(ParallelProcessor::new(ctx.clone(), 0).parallelism(), 1);
        assert_eq!(ParallelProcessor::new(ctx, 6).parallelism(), 6);
    }

    #[tokio::test]
    async fn shares_one_context_across_concurrent_jobs() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(dir.path());
        let out = ctx.writer.output_dir().to_path_buf();

        let mut sets = Vec::new();
        for i in 0..2 {
            let set = dir.path().join(format!("sub-{i:02}.set"));
            let recording = synth::generate(64, 2, 64, 250.0, Some("biosemi64"), 20 + i);
            synth::write_pair(&set, &recording).unwrap();
            sets.push(set);
        }

        let processor = ParallelProcessor::new(ctx, 2);
        let a = Job::new(&sets[0], JobConfig::new(&out));
        let b = Job::new(&sets[1], JobConfig::new(&out));
        let (ra, rb) = tokio::join!(processor.process(&a), processor.process(&b));

        assert!(ra.is_success());
        assert!(rb.is_success());
        assert_eq!(ra.variant, "parallel");
        assert_ne!(ra.output, rb.output);
    }
}
