//! Sequential backend: one job at a time, the baseline the others are
//! measured against.

use std::future::Future;
use std::pin::Pin;

use super::stages::{self, ExecParams, StageContext};
use super::{Job, JobResult, Processor, VariantKind};

pub struct SequentialProcessor {
    ctx: StageContext,
    exec: ExecParams,
}

impl SequentialProcessor {
    pub fn new(ctx: StageContext) -> Self {
        Self {
            ctx,
            exec: ExecParams {
                kind: VariantKind::Sequential,
                label: VariantKind::Sequential.to_string(),
                device: None,
            },
        }
    }
}

impl Processor for SequentialProcessor {
    fn kind(&self) -> VariantKind {
        VariantKind::Sequential
    }

    fn parallelism(&self) -> usize {
        1
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

    #[tokio::test]
    async fn processes_through_the_trait_object() {
        let dir = tempfile::TempDir::new().unwrap();
        let recording = synth::generate(64, 2, 64, 250.0, Some("biosemi64"), 3);
        let set = dir.path().join("sub-01.set");
        synth::write_pair(&set, &recording).unwrap();

        let ctx = StageContext {
            memory: Arc::new(MemoryManager::new(256 * 1024 * 1024)),
            cache: None,
            kernel: Arc::new(MinimumNormKernel::new()),
            reader: Arc::new(FdtPairReader::new()),
            writer: Arc::new(ResultWriter::new(dir.path().join("out")).unwrap()),
            default_montage: "biosemi64".to_string(),
            admission_timeout: Duration::from_secs(5),
            claim_wait: Duration::from_secs(5),
        };

        let processor: Box<dyn Processor> = Box::new(SequentialProcessor::new(ctx));
        assert_eq!(processor.kind(), VariantKind::Sequential);
        assert_eq!(processor.name(), "sequential");
        assert_eq!(processor.parallelism(), 1);

        let job = Job::new(&set, JobConfig::new(dir.path().join("out")));
        let result = processor.process(&job).await;
        assert!(result.is_success());
        assert_eq!(result.variant, "sequential");
        assert_eq!(result.attempts, 1);
    }
}
