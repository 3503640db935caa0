//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and a
//! `run` handler returning the process exit code.
//!
//! # Command Modules
//!
//! - [`process`] - Localize a batch of recordings
//! - [`validate`] - Screen recordings without processing
//! - [`info`] - Describe a recording, or the host and configuration
//! - [`benchmark`] - Compare execution backends
//! - [`cache`] - Artifact cache management (stats, clear)
//! - [`config`] - Configuration management (show, path, init)

pub mod benchmark;
pub mod cache;
pub mod common;
pub mod config;
pub mod info;
pub mod process;
pub mod validate;
