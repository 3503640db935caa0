//! eeg2source CLI - batch EEG source localization from the command line.
//!
//! This binary is a thin layer over the `eeg2source` library: argument
//! parsing, config-file overlay, and human-readable reporting. Exit codes:
//! 0 when every job succeeded, 1 when any job failed or a recording did
//! not validate, 2 for setup and usage errors.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::{benchmark, cache, config, info, process, validate};

#[derive(Parser)]
#[command(name = "eeg2source")]
#[command(version = eeg2source::VERSION)]
#[command(about = "EEG source localization to Desikan-Killiany region time-courses")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Localize recordings and write region time-courses
    Process(process::ProcessArgs),
    /// Check recordings without processing them
    Validate(validate::ValidateArgs),
    /// Describe a recording, or the host and configuration
    Info(info::InfoArgs),
    /// Compare execution backends over sample recordings
    Benchmark(benchmark::BenchmarkArgs),
    /// Inspect or clear the artifact cache
    Cache {
        #[command(subcommand)]
        action: cache::CacheAction,
    },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Process(args) => process::run(args).await,
        Commands::Validate(args) => validate::run(args),
        Commands::Info(args) => info::run(args),
        Commands::Benchmark(args) => benchmark::run(args).await,
        Commands::Cache { action } => cache::run(action).await,
        Commands::Config { action } => config::run(action),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => err.exit(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
