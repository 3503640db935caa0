//! Settings structs for each configuration section.
//!
//! These are plain data carriers grouped the way the INI file is grouped:
//! `[processing]`, `[memory]`, `[cache]`, `[robust]`. Defaults live in
//! [`super::defaults`], INI mapping in [`super::parser`] and
//! [`super::writer`].

use std::path::PathBuf;
use std::time::Duration;

use crate::kernel::gpu::GpuBackendSelect;
use crate::processor::VariantKind;

use super::defaults::*;

/// Per-job processing parameters (`[processing]`).
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingSettings {
    /// Electrode montage name the recordings are expected to use.
    pub montage: String,
    /// Target sampling rate applied before localization, in Hz.
    pub resample_hz: f64,
    /// Regularization parameter for the inverse solution (1/SNR²).
    pub lambda2: f64,
    /// Which execution backend processes the batch.
    pub backend: VariantKind,
    /// Accelerator selection for the GPU backend.
    pub gpu_backend: GpuBackendSelect,
    /// Worker count for the parallel and GPU backends.
    pub workers: usize,
}

impl ProcessingSettings {
    pub fn with_montage(mut self, montage: impl Into<String>) -> Self {
        self.montage = montage.into();
        self
    }

    pub fn with_resample_hz(mut self, hz: f64) -> Self {
        self.resample_hz = hz;
        self
    }

    pub fn with_backend(mut self, backend: VariantKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_gpu_backend(mut self, select: GpuBackendSelect) -> Self {
        self.gpu_backend = select;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Memory admission settings (`[memory]`).
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySettings {
    /// Global budget for concurrently held grants, in bytes.
    pub budget: u64,
    /// How long a job may wait for admission before failing.
    pub admission_timeout: Duration,
    /// Process recordings in epoch chunks when they exceed the budget.
    pub chunked: bool,
}

impl MemorySettings {
    pub fn with_budget(mut self, bytes: u64) -> Self {
        self.budget = bytes;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    pub fn with_chunked(mut self, chunked: bool) -> Self {
        self.chunked = chunked;
        self
    }
}

/// Artifact cache settings (`[cache]`).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Whether the operator cache is consulted at all.
    pub enabled: bool,
    /// Directory holding cached artifacts.
    pub directory: PathBuf,
    /// Size ceiling; least-recently-used entries are evicted above it.
    pub max_size: u64,
    /// Also cache final per-recording results, keyed by content digest.
    pub results: bool,
}

impl CacheSettings {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn with_results(mut self, results: bool) -> Self {
        self.results = results;
        self
    }
}

/// Failure recovery settings (`[robust]`).
#[derive(Debug, Clone, PartialEq)]
pub struct RobustSettings {
    /// Whether failures are classified and retried at all.
    pub enabled: bool,
    /// Retry montage mismatches once, accepting the recording's layout.
    pub relaxed_montage: bool,
    /// Retry data-quality failures once with flagged channels excluded.
    pub clean_channels: bool,
    /// Retry memory-exceeded failures once in chunked mode.
    pub chunked_retry: bool,
}

impl RobustSettings {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_relaxed_montage(mut self, relaxed: bool) -> Self {
        self.relaxed_montage = relaxed;
        self
    }

    pub fn with_clean_channels(mut self, clean: bool) -> Self {
        self.clean_channels = clean;
        self
    }

    pub fn with_chunked_retry(mut self, chunked: bool) -> Self {
        self.chunked_retry = chunked;
        self
    }
}

/// The complete configuration file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub processing: ProcessingSettings,
    pub memory: MemorySettings,
    pub cache: CacheSettings,
    pub robust: RobustSettings,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            montage: DEFAULT_MONTAGE.to_string(),
            resample_hz: DEFAULT_RESAMPLE_HZ,
            lambda2: DEFAULT_LAMBDA2,
            backend: VariantKind::Parallel,
            gpu_backend: GpuBackendSelect::Auto,
            workers: default_workers(),
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            budget: DEFAULT_MEMORY_BUDGET,
            admission_timeout: Duration::from_secs(DEFAULT_ADMISSION_TIMEOUT_SECS),
            chunked: false,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_dir(),
            max_size: DEFAULT_CACHE_SIZE,
            results: false,
        }
    }
}

impl Default for RobustSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            relaxed_montage: true,
            clean_channels: true,
            chunked_retry: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ConfigFile::default();
        assert_eq!(config.processing.montage, DEFAULT_MONTAGE);
        assert_eq!(config.processing.resample_hz, 250.0);
        assert!(config.processing.workers >= 1);
        assert_eq!(config.memory.budget, 4 * 1024 * 1024 * 1024);
        assert!(config.cache.enabled);
        assert!(config.robust.enabled);
    }

    #[test]
    fn builders_overlay_fields() {
        let memory = MemorySettings::default()
            .with_budget(1024)
            .with_chunked(true);
        assert_eq!(memory.budget, 1024);
        assert!(memory.chunked);

        let cache = CacheSettings::default()
            .with_enabled(false)
            .with_directory("/tmp/e2s-cache");
        assert!(!cache.enabled);
        assert_eq!(cache.directory, PathBuf::from("/tmp/e2s-cache"));
    }
}
