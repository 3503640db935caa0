//! Info command - describe a recording, or the host and configuration.

use std::path::{Path, PathBuf};

use clap::Args;

use eeg2source::config::format_size;
use eeg2source::io::{validate_file, FdtPairReader, ResultMetadata, ValidationOutcome};
use eeg2source::kernel::{DESIKAN_KILLIANY_68, REGION_COUNT};
use eeg2source::system::{recommended_memory_budget, SystemInfo};

use super::common;
use crate::error::CliError;

/// Arguments for the info command.
#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Recording to describe; omit for host and configuration info
    pub file: Option<PathBuf>,
}

/// Run the info command.
pub fn run(args: InfoArgs) -> Result<i32, CliError> {
    match args.file {
        Some(file) => file_info(&file),
        None => host_info(),
    }
}

fn file_info(path: &Path) -> Result<i32, CliError> {
    let report = validate_file(&FdtPairReader::new(), path);

    println!("{}", path.display());
    match report.outcome {
        ValidationOutcome::Readable { meta, quality } => {
            println!("  channels: {}", meta.n_channels);
            println!("  epochs:   {}", meta.n_epochs);
            println!("  samples:  {} per epoch", meta.n_samples);
            println!("  rate:     {} Hz", meta.sfreq_hz);
            println!(
                "  montage:  {}",
                meta.montage.as_deref().unwrap_or("(none declared)")
            );
            println!("  data:     {}", format_size(meta.sample_bytes()));
            println!("  quality:  {}", quality);
            Ok(if quality.is_clean() { 0 } else { 1 })
        }
        ValidationOutcome::Unreadable { reason } => {
            println!("  unreadable: {}", reason);
            Ok(1)
        }
    }
}

fn host_info() -> Result<i32, CliError> {
    let config = common::load_config()?;
    let system = SystemInfo::detect();

    println!("eeg2source {}", eeg2source::VERSION);
    println!();
    println!("host");
    println!("  cpu cores: {}", system.cpu_cores);
    println!("  memory:    {}", system.memory_display());
    println!("  gpu:       {}", system.gpu_display());
    println!();
    println!("settings");
    println!("  montage:   {}", config.processing.montage);
    println!("  resample:  {} Hz", config.processing.resample_hz);
    println!("  lambda2:   {:.6}", config.processing.lambda2);
    println!(
        "  backend:   {} ({} workers)",
        config.processing.backend, config.processing.workers
    );
    println!(
        "  budget:    {} (recommended ceiling {})",
        format_size(config.memory.budget),
        format_size(recommended_memory_budget(system.total_memory))
    );
    println!(
        "  cache:     {} at {} (ceiling {})",
        if config.cache.enabled { "on" } else { "off" },
        config.cache.directory.display(),
        format_size(config.cache.max_size)
    );
    println!(
        "  robust:    {}",
        if config.robust.enabled { "on" } else { "off" }
    );
    println!();
    println!("atlas");
    println!(
        "  {} regions, {}",
        REGION_COUNT,
        ResultMetadata::ATLAS_VERSION
    );
    println!(
        "  {}, {}, ... {}",
        DESIKAN_KILLIANY_68[0],
        DESIKAN_KILLIANY_68[1],
        DESIKAN_KILLIANY_68[REGION_COUNT - 1]
    );

    Ok(0)
}
