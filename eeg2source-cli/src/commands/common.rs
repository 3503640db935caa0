//! Common types and utilities shared across CLI commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;

use eeg2source::cache::ArtifactCache;
use eeg2source::config::{
    parse_size, CacheSettings, ConfigFile, MemorySettings, ProcessingSettings, RobustSettings,
    DEFAULT_CLAIM_WAIT_SECS,
};
use eeg2source::io::{FdtPairReader, ResultWriter};
use eeg2source::kernel::{GpuBackendSelect, MinimumNormKernel};
use eeg2source::memory::MemoryManager;
use eeg2source::processor::{
    GpuProcessor, ParallelProcessor, Processor, SequentialProcessor, StageContext, VariantKind,
};
use eeg2source::robust::{RetryPolicy, RobustProcessor};

use crate::error::CliError;

/// Execution backend selection for CLI arguments.
#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum BackendArg {
    /// One job at a time on the CPU; the reference baseline
    Sequential,
    /// Worker pool sharing the memory budget
    Parallel,
    /// Accelerated source projection (CUDA or Metal)
    Gpu,
}

impl BackendArg {
    pub fn kind(self) -> VariantKind {
        match self {
            BackendArg::Sequential => VariantKind::Sequential,
            BackendArg::Parallel => VariantKind::Parallel,
            BackendArg::Gpu => VariantKind::Gpu,
        }
    }
}

/// Accelerator selection for the gpu backend.
#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum GpuBackendArg {
    /// Probe CUDA first, then Metal
    Auto,
    /// Require CUDA
    Cuda,
    /// Require Metal
    Metal,
}

impl GpuBackendArg {
    pub fn select(self) -> GpuBackendSelect {
        match self {
            GpuBackendArg::Auto => GpuBackendSelect::Auto,
            GpuBackendArg::Cuda => GpuBackendSelect::Cuda,
            GpuBackendArg::Metal => GpuBackendSelect::Metal,
        }
    }
}

/// Load the config file, failing loudly on a malformed one.
pub fn load_config() -> Result<ConfigFile, CliError> {
    ConfigFile::load().map_err(|e| CliError::Config(e.to_string()))
}

/// Parse a human-readable size flag, naming the flag in the error.
pub fn parse_byte_size(flag: &str, value: &str) -> Result<u64, CliError> {
    parse_size(value).map_err(|e| CliError::Config(format!("{flag}: {e}")))
}

/// Assemble the shared stage context from effective settings.
///
/// Returns the memory manager alongside the context so callers can report
/// peak usage after the run.
pub async fn build_context(
    processing: &ProcessingSettings,
    memory: &MemorySettings,
    cache: &CacheSettings,
    output_dir: &Path,
) -> Result<(StageContext, Arc<MemoryManager>), CliError> {
    let manager = Arc::new(MemoryManager::new(memory.budget));

    let artifact_cache = if cache.enabled {
        let opened = ArtifactCache::open(cache.directory.clone(), cache.max_size)
            .await
            .map_err(|e| CliError::Setup(format!("opening artifact cache: {e}")))?;
        Some(opened)
    } else {
        None
    };

    let writer = ResultWriter::new(output_dir)
        .map_err(|e| CliError::Setup(format!("preparing output directory: {e}")))?;

    let context = StageContext {
        memory: Arc::clone(&manager),
        cache: artifact_cache,
        kernel: Arc::new(MinimumNormKernel::new()),
        reader: Arc::new(FdtPairReader::new()),
        writer: Arc::new(writer),
        default_montage: processing.montage.clone(),
        admission_timeout: memory.admission_timeout,
        claim_wait: Duration::from_secs(DEFAULT_CLAIM_WAIT_SECS),
    };
    Ok((context, manager))
}

/// Build the processor the batch will run on.
///
/// With robust mode on, the requested backend gets the recovery wrapper
/// and its CPU degradation chain. With it off, a gpu request fails hard
/// when no accelerator is present.
pub fn build_processor(
    context: StageContext,
    processing: &ProcessingSettings,
    robust: &RobustSettings,
) -> Result<Arc<dyn Processor>, CliError> {
    if robust.enabled {
        let policy = RetryPolicy {
            relaxed_montage: robust.relaxed_montage,
            clean_channels: robust.clean_channels,
            chunked_retry: robust.chunked_retry,
        };
        let processor = RobustProcessor::for_backend(
            &context,
            processing.backend,
            processing.workers,
            processing.gpu_backend,
            policy,
        );
        return Ok(Arc::new(processor));
    }

    let processor: Arc<dyn Processor> = match processing.backend {
        VariantKind::Sequential => Arc::new(SequentialProcessor::new(context)),
        VariantKind::Parallel => Arc::new(ParallelProcessor::new(context, processing.workers)),
        VariantKind::Gpu => {
            let gpu = GpuProcessor::new(context, processing.gpu_backend, processing.workers)
                .map_err(|e| CliError::Backend(e.to_string()))?;
            Arc::new(gpu)
        }
    };
    Ok(processor)
}

/// Render rows as a column-aligned table, two spaces between columns.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[String]| {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            line.push_str(&format!("{:<width$}  ", cell, width = widths[i]));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    push_row(&header_cells);
    for row in rows {
        push_row(row);
    }
    out
}
