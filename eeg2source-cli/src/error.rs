//! CLI error handling with user-friendly messages.
//!
//! Centralizes error formatting for the binary. Setup and usage failures
//! exit with code 2; individual job failures are reported through the
//! batch summary and exit with code 1.

use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    Logging(String),
    /// Configuration file or flag value error
    Config(String),
    /// Input discovery failed or produced nothing to process
    Inputs(String),
    /// Failed to assemble the processing engine
    Setup(String),
    /// Requested backend could not be constructed
    Backend(String),
    /// Benchmark run failed before producing a report
    Benchmark(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Backend(_) => {
                eprintln!();
                eprintln!("No usable accelerator was found. Options:");
                eprintln!("  1. Pass --gpu-backend auto to probe CUDA and Metal in order");
                eprintln!("  2. Choose --backend parallel or --backend sequential instead");
                eprintln!("  3. Leave robust mode on so gpu falls back to the CPU backends");
            }
            CliError::Inputs(_) => {
                eprintln!();
                eprintln!("Inputs must be .set files or directories containing them.");
                eprintln!("Pass --recursive to search subdirectories.");
            }
            _ => {}
        }

        process::exit(2)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Logging(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Inputs(msg) => write!(f, "Input error: {}", msg),
            CliError::Setup(msg) => write!(f, "Setup failed: {}", msg),
            CliError::Backend(msg) => write!(f, "Backend unavailable: {}", msg),
            CliError::Benchmark(msg) => write!(f, "Benchmark failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}
