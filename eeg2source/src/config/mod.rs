//! Configuration: settings structs, defaults, and the INI config file.
//!
//! Layout mirrors the file on disk: each `[section]` in
//! `~/.eeg2source/config.ini` has a settings struct in [`settings`], its
//! defaults in [`defaults`], its INI mapping in `parser`/`writer`, and the
//! load/save entry points on [`ConfigFile`].

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::{
    config_dir, config_file_path, default_cache_dir, default_log_dir, default_workers, num_cpus,
    DEFAULT_ADMISSION_TIMEOUT_SECS, DEFAULT_CACHE_SIZE, DEFAULT_CLAIM_WAIT_SECS, DEFAULT_LAMBDA2,
    DEFAULT_MEMORY_BUDGET, DEFAULT_MONTAGE, DEFAULT_RESAMPLE_HZ,
};
pub use file::ConfigFileError;
pub use settings::{CacheSettings, ConfigFile, MemorySettings, ProcessingSettings, RobustSettings};
pub use size::{format_size, parse_size, ByteSize, SizeParseError};
pub use writer::to_config_string;
