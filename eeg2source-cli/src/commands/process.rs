//! Process command - run the localization batch over recordings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;

use eeg2source::batch::{BatchRunner, BatchSummary};
use eeg2source::config::{
    format_size, CacheSettings, ConfigFile, MemorySettings, ProcessingSettings, RobustSettings,
};
use eeg2source::errors::ErrorSink;
use eeg2source::io::discover_inputs;
use eeg2source::logging::init_logging;
use eeg2source::processor::{Job, JobConfig, JobStatus};
use eeg2source::system::SystemInfo;

use super::common::{self, BackendArg, GpuBackendArg};
use crate::error::CliError;

/// Arguments for the process command.
#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Recordings (.set) or directories containing them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Search directories recursively
    #[arg(long)]
    pub recursive: bool,

    /// Directory receiving region time-courses and metadata
    #[arg(long, default_value = "eeg2source-out")]
    pub output_dir: PathBuf,

    /// Electrode montage override [default: GSN-HydroCel-129, or the
    /// recording header when it names one]
    #[arg(long)]
    pub montage: Option<String>,

    /// Target sampling rate in Hz [default: 250]
    #[arg(long)]
    pub resample_hz: Option<f64>,

    /// Inverse-solution regularization, 1/SNR^2 [default: 0.111]
    #[arg(long)]
    pub lambda2: Option<f64>,

    /// Execution backend [default: parallel]
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Accelerator for the gpu backend [default: auto]
    #[arg(long, value_enum)]
    pub gpu_backend: Option<GpuBackendArg>,

    /// Worker count for the parallel and gpu backends [default: CPU count]
    #[arg(long)]
    pub workers: Option<usize>,

    /// Memory budget for concurrently admitted jobs, e.g. 4GB [default: 4GB]
    #[arg(long)]
    pub max_memory: Option<String>,

    /// Seconds a job may wait for admission before failing [default: 120]
    #[arg(long)]
    pub admission_timeout_secs: Option<u64>,

    /// Process recordings in epoch chunks from the start
    #[arg(long)]
    pub chunked: bool,

    /// Disable the artifact cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Artifact cache directory [default: ~/.eeg2source/cache]
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Artifact cache size ceiling, e.g. 10GB [default: 10GB]
    #[arg(long)]
    pub cache_size: Option<String>,

    /// Fail jobs on the first error instead of retrying and degrading
    #[arg(long)]
    pub no_robust: bool,

    /// Directory for persisted error records [default: <output-dir>/errors]
    #[arg(long)]
    pub error_dir: Option<PathBuf>,

    /// Also write log output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level when RUST_LOG is unset [default: info]
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Run the process command.
pub async fn run(args: ProcessArgs) -> Result<i32, CliError> {
    let _logging = init_logging(&args.log_level, args.log_file.as_deref())
        .map_err(|e| CliError::Logging(e.to_string()))?;

    let config = common::load_config()?;
    let (processing, memory, cache, robust) = effective_settings(&args, config)?;

    let inputs = discover_inputs(&args.inputs, args.recursive)
        .map_err(|e| CliError::Inputs(e.to_string()))?;
    if inputs.is_empty() {
        return Err(CliError::Inputs("no .set recordings found".to_string()));
    }

    tracing::info!(
        version = eeg2source::VERSION,
        inputs = inputs.len(),
        backend = %processing.backend,
        budget = %format_size(memory.budget),
        "starting batch"
    );

    let (context, _manager) =
        common::build_context(&processing, &memory, &cache, &args.output_dir).await?;
    let processor = common::build_processor(context, &processing, &robust)?;

    let error_dir = args
        .error_dir
        .clone()
        .unwrap_or_else(|| args.output_dir.join("errors"));
    let sink = ErrorSink::new(&error_dir)
        .map_err(|e| CliError::Setup(format!("preparing error directory: {e}")))?;

    let runner = BatchRunner::new(processor).with_error_sink(sink);

    // Ctrl-C cancels jobs that have not started; in-flight jobs finish.
    let token = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling pending jobs");
            token.cancel();
        }
    });

    let jobs: Vec<Job> = inputs
        .iter()
        .map(|input| Job::new(input.clone(), job_config(&args, &processing, &memory, &cache)))
        .collect();

    let summary = runner.run(jobs).await;
    report(&summary, &error_dir);
    Ok(summary.exit_code())
}

/// Config-file settings with CLI flags laid over them.
fn effective_settings(
    args: &ProcessArgs,
    config: ConfigFile,
) -> Result<(ProcessingSettings, MemorySettings, CacheSettings, RobustSettings), CliError> {
    let mut processing = config.processing;
    if let Some(hz) = args.resample_hz {
        processing.resample_hz = hz;
    }
    if let Some(lambda2) = args.lambda2 {
        processing.lambda2 = lambda2;
    }
    if let Some(backend) = args.backend {
        processing.backend = backend.kind();
    }
    if let Some(gpu) = args.gpu_backend {
        processing.gpu_backend = gpu.select();
    }
    if let Some(workers) = args.workers {
        processing.workers = workers;
    }

    let mut memory = config.memory;
    if let Some(size) = &args.max_memory {
        memory.budget = common::parse_byte_size("--max-memory", size)?;
    }
    if let Some(secs) = args.admission_timeout_secs {
        memory.admission_timeout = Duration::from_secs(secs);
    }
    if args.chunked {
        memory.chunked = true;
    }

    let clamped = SystemInfo::detect().clamp_budget(memory.budget);
    if clamped < memory.budget {
        tracing::warn!(
            requested = %format_size(memory.budget),
            clamped = %format_size(clamped),
            "memory budget exceeds host memory, clamping"
        );
        memory.budget = clamped;
    }

    let mut cache = config.cache;
    if args.no_cache {
        cache.enabled = false;
    }
    if let Some(dir) = &args.cache_dir {
        cache.directory = dir.clone();
    }
    if let Some(size) = &args.cache_size {
        cache.max_size = common::parse_byte_size("--cache-size", size)?;
    }

    let mut robust = config.robust;
    if args.no_robust {
        robust.enabled = false;
    }

    Ok((processing, memory, cache, robust))
}

/// Per-job configuration from the effective settings.
///
/// `--montage` becomes an explicit override; without it, resolution stays
/// config default < recording header.
fn job_config(
    args: &ProcessArgs,
    processing: &ProcessingSettings,
    memory: &MemorySettings,
    cache: &CacheSettings,
) -> JobConfig {
    let mut config = JobConfig::new(&args.output_dir)
        .with_resample_hz(processing.resample_hz)
        .with_lambda2(processing.lambda2)
        .with_chunked(memory.chunked);
    config.montage = args.montage.clone();
    config.use_result_cache = cache.results;
    config
}

/// Print per-file status lines and the final summary.
fn report(summary: &BatchSummary, error_dir: &Path) {
    for result in &summary.results {
        let name = result.input.display();
        match result.status {
            JobStatus::Succeeded => {
                let mut notes = Vec::new();
                if result.cache.result_hit == Some(true) {
                    notes.push("cached result".to_string());
                } else if result.cache.operator_hit == Some(true) {
                    notes.push("cached operator".to_string());
                }
                if result.chunked {
                    notes.push("chunked".to_string());
                }
                if result.attempts > 1 {
                    notes.push(format!("{} attempts", result.attempts));
                }
                let notes = if notes.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", notes.join(", "))
                };
                let output = result
                    .output
                    .as_ref()
                    .map(|paths| paths.timecourses.display().to_string())
                    .unwrap_or_default();
                println!(
                    "ok      {} -> {} [{}ms]{}",
                    name,
                    output,
                    result.duration.as_millis(),
                    notes
                );
            }
            JobStatus::Failed => match &result.error {
                Some(record) => {
                    println!("failed  {} [{}] {}", name, record.category, record.message)
                }
                None => println!("failed  {}", name),
            },
            JobStatus::Cancelled => println!("skip    {} (cancelled)", name),
            _ => {}
        }
    }

    println!();
    println!(
        "{} job(s): {} succeeded, {} failed, {} cancelled in {:.1}s",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.cancelled,
        summary.elapsed.as_secs_f64()
    );
    if summary.operator_cache_hits + summary.result_cache_hits > 0 {
        println!(
            "cache: {} operator hit(s), {} result hit(s)",
            summary.operator_cache_hits, summary.result_cache_hits
        );
    }
    if summary.failed > 0 {
        println!("error records: {}", error_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg2source::processor::VariantKind;

    fn base_args() -> ProcessArgs {
        ProcessArgs {
            inputs: vec![PathBuf::from("rec.set")],
            recursive: false,
            output_dir: PathBuf::from("out"),
            montage: None,
            resample_hz: None,
            lambda2: None,
            backend: None,
            gpu_backend: None,
            workers: None,
            max_memory: None,
            admission_timeout_secs: None,
            chunked: false,
            no_cache: false,
            cache_dir: None,
            cache_size: None,
            no_robust: false,
            error_dir: None,
            log_file: None,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn flags_override_config_defaults() {
        let mut args = base_args();
        args.backend = Some(BackendArg::Sequential);
        args.max_memory = Some("1GB".to_string());
        args.no_cache = true;
        args.no_robust = true;

        let (processing, memory, cache, robust) =
            effective_settings(&args, ConfigFile::default()).unwrap();
        assert_eq!(processing.backend, VariantKind::Sequential);
        assert_eq!(memory.budget, 1 << 30);
        assert!(!cache.enabled);
        assert!(!robust.enabled);
    }

    #[test]
    fn bad_size_flag_is_a_config_error() {
        let mut args = base_args();
        args.max_memory = Some("a-lot".to_string());
        let err = effective_settings(&args, ConfigFile::default()).unwrap_err();
        assert!(err.to_string().contains("--max-memory"));
    }

    #[test]
    fn montage_flag_becomes_a_job_override() {
        let config = ConfigFile::default();
        let mut args = base_args();

        let plain = job_config(&args, &config.processing, &config.memory, &config.cache);
        assert_eq!(plain.montage, None);
        assert!(!plain.use_result_cache);

        args.montage = Some("biosemi64".to_string());
        args.chunked = true;
        let (processing, memory, cache, _) =
            effective_settings(&args, ConfigFile::default()).unwrap();
        let overridden = job_config(&args, &processing, &memory, &cache);
        assert_eq!(overridden.montage.as_deref(), Some("biosemi64"));
        assert!(overridden.chunked);
    }
}
