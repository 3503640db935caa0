//! Benchmark command - compare execution backends over sample files.

use std::path::PathBuf;

use clap::Args;

use eeg2source::benchmark::BenchmarkHarness;
use eeg2source::io::discover_inputs;
use eeg2source::processor::VariantKind;

use super::common::{self, BackendArg};
use crate::error::CliError;

/// Arguments for the benchmark command.
#[derive(Debug, Args)]
pub struct BenchmarkArgs {
    /// Recordings (.set) or directories containing them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Search directories recursively
    #[arg(long)]
    pub recursive: bool,

    /// Backend to measure; repeat for several [default: sequential, parallel]
    #[arg(long = "variants", value_enum)]
    pub variants: Vec<BackendArg>,

    /// Share one artifact cache across backends instead of starting each
    /// backend cold
    #[arg(long)]
    pub warm: bool,

    /// Emit the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Scratch directory for benchmark caches and outputs
    /// [default: under the system temp directory]
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,
}

/// Run the benchmark command.
pub async fn run(args: BenchmarkArgs) -> Result<i32, CliError> {
    let config = common::load_config()?;

    let inputs = discover_inputs(&args.inputs, args.recursive)
        .map_err(|e| CliError::Inputs(e.to_string()))?;
    if inputs.is_empty() {
        return Err(CliError::Inputs("no .set recordings found".to_string()));
    }

    let mut variants: Vec<VariantKind> = Vec::new();
    for arg in &args.variants {
        let kind = arg.kind();
        if !variants.contains(&kind) {
            variants.push(kind);
        }
    }
    if variants.is_empty() {
        variants = vec![VariantKind::Sequential, VariantKind::Parallel];
    }

    let scratch = args.scratch_dir.clone().unwrap_or_else(|| {
        std::env::temp_dir().join(format!("eeg2source-bench-{}", std::process::id()))
    });

    let harness = BenchmarkHarness::new(inputs, scratch)
        .with_variants(variants)
        .with_warm(args.warm)
        .with_processing(config.processing)
        .with_memory(config.memory);

    let report = harness
        .run()
        .await
        .map_err(|e| CliError::Benchmark(e.to_string()))?;

    if args.json {
        let json = report
            .to_json()
            .map_err(|e| CliError::Benchmark(e.to_string()))?;
        println!("{}", json);
    } else {
        print!("{}", report.render_table());
    }

    Ok(0)
}
