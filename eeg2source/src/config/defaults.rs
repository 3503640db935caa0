//! Default values and constants for all configuration settings.

use std::path::PathBuf;

/// Electrode montage assumed when none is given.
pub const DEFAULT_MONTAGE: &str = "GSN-HydroCel-129";

/// Target sampling rate in Hz.
pub const DEFAULT_RESAMPLE_HZ: f64 = 250.0;

/// Regularization parameter, 1/SNR² with the conventional SNR of 3.
pub const DEFAULT_LAMBDA2: f64 = 1.0 / 9.0;

/// Memory budget for concurrently admitted jobs: 4 GiB.
pub const DEFAULT_MEMORY_BUDGET: u64 = 4 * 1024 * 1024 * 1024;

/// How long a job waits for memory admission before giving up.
pub const DEFAULT_ADMISSION_TIMEOUT_SECS: u64 = 120;

/// Artifact cache ceiling: 10 GiB.
pub const DEFAULT_CACHE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// How long a cache lookup waits on a key another job is computing.
pub const DEFAULT_CLAIM_WAIT_SECS: u64 = 300;

/// Get the number of available logical CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Default worker count for the parallel and GPU backends.
pub fn default_workers() -> usize {
    num_cpus()
}

/// Configuration directory: `~/.eeg2source`.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".eeg2source")
}

/// Configuration file path: `~/.eeg2source/config.ini`.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// Default artifact cache directory: `~/.eeg2source/cache`.
pub fn default_cache_dir() -> PathBuf {
    config_dir().join("cache")
}

/// Default log directory: `~/.eeg2source/logs`.
pub fn default_log_dir() -> PathBuf {
    config_dir().join("logs")
}
