//! GPU backend: pipeline stages on the CPU, kernel launches serialized
//! through a [`DeviceQueue`].
//!
//! Construction probes for a device and fails with
//! `BackendUnavailable` when none is usable, so callers learn up front
//! that fallback is needed instead of once per job. Several jobs may
//! read and preprocess concurrently; only the operator product itself
//! queues on the device.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::kernel::gpu::{self, DeviceQueue};
use crate::kernel::{GpuBackendSelect, KernelError};

use super::stages::{self, ExecParams, StageContext};
use super::{Job, JobResult, Processor, VariantKind};

pub struct GpuProcessor {
    ctx: StageContext,
    exec: ExecParams,
    workers: usize,
}

impl GpuProcessor {
    /// Probe for a device and build the backend.
    pub fn new(
        ctx: StageContext,
        select: GpuBackendSelect,
        workers: usize,
    ) -> Result<Self, KernelError> {
        let backend = gpu::probe(select)?;
        tracing::info!(backend = %backend, "gpu backend selected");
        Ok(Self {
            ctx,
            workers: workers.max(1),
            exec: ExecParams {
                kind: VariantKind::Gpu,
                label: format!("gpu({backend})"),
                device: Some(Arc::new(DeviceQueue::new(backend))),
            },
        })
    }
}

impl Processor for GpuProcessor {
    fn kind(&self) -> VariantKind {
        VariantKind::Gpu
    }

    fn name(&self) -> String {
        self.exec.label.clone()
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
