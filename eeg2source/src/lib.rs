//! eeg2source - EEG source localization to atlas region time-courses
//!
//! Processes epoched EEG recordings into source-space activity averaged
//! over the 68 Desikan-Killiany cortical regions. The engine runs whole
//! batches under a global memory budget, caches the expensive inverse
//! operators between runs, and degrades per job (retry, backend
//! fallback, chunked processing) instead of failing a batch.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use eeg2source::batch::BatchRunner;
//! use eeg2source::processor::VariantKind;
//! use eeg2source::robust::{RetryPolicy, RobustProcessor};
//!
//! let processor = RobustProcessor::for_backend(
//!     &ctx,
//!     VariantKind::Parallel,
//!     workers,
//!     gpu_select,
//!     RetryPolicy::default(),
//! );
//! let runner = BatchRunner::new(Arc::new(processor)).with_error_sink(sink);
//! let summary = runner.run(jobs).await;
//! std::process::exit(summary.exit_code());
//! ```

pub mod batch;
pub mod benchmark;
pub mod cache;
pub mod config;
pub mod errors;
pub mod io;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod processor;
pub mod robust;
pub mod system;

/// Version of the eeg2source library and CLI.
///
/// Synchronized across the workspace; injected from `Cargo.toml` at
/// compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_injected() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn atlas_has_sixty_eight_regions() {
        assert_eq!(kernel::REGION_COUNT, 68);
        assert_eq!(kernel::DESIKAN_KILLIANY_68.len(), 68);
    }
}
