//! System hardware detection and configuration recommendations.
//!
//! Detects CPU, memory, and accelerator availability so the `info`
//! command can describe the host and so default settings can be clamped
//! to what the machine actually has.

use crate::config::{format_size, num_cpus};
use crate::kernel::gpu::{self, GpuBackendSelect};
use crate::kernel::GpuBackendKind;

/// Detected host hardware.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Number of logical CPU cores.
    pub cpu_cores: usize,
    /// Total system memory in bytes.
    pub total_memory: u64,
    /// Accelerator found by the auto probe, if any.
    pub gpu: Option<GpuBackendKind>,
}

impl SystemInfo {
    /// Detect the host this process runs on.
    pub fn detect() -> Self {
        Self {
            cpu_cores: num_cpus(),
            total_memory: detect_total_memory(),
            gpu: gpu::probe(GpuBackendSelect::Auto).ok(),
        }
    }

    /// Cap a configured memory budget at what this host can sustain.
    ///
    /// A budget above 80% of physical memory would let admitted jobs
    /// push the host into swap, which is slower than chunked mode.
    pub fn clamp_budget(&self, configured: u64) -> u64 {
        configured.min(recommended_memory_budget(self.total_memory))
    }

    /// Formatted total memory, e.g. `16GB`.
    pub fn memory_display(&self) -> String {
        format_size(self.total_memory)
    }

    /// Accelerator name for display, `none` when no probe matched.
    pub fn gpu_display(&self) -> String {
        match self.gpu {
            Some(backend) => backend.to_string(),
            None => "none".to_string(),
        }
    }
}

/// Largest memory budget worth configuring: 80% of physical memory.
pub fn recommended_memory_budget(total_memory: u64) -> u64 {
    total_memory / 5 * 4
}

/// Total system memory in bytes, from `/proc/meminfo`.
#[cfg(target_os = "linux")]
pub fn detect_total_memory() -> u64 {
    if let Ok(content) = std::fs::read_to_string("/proc/meminfo") {
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                // "MemTotal:       16384000 kB"
                if let Some(kb) = rest.split_whitespace().next() {
                    if let Ok(kb) = kb.parse::<u64>() {
                        return kb * 1024;
                    }
                }
            }
        }
    }
    fallback_memory()
}

#[cfg(not(target_os = "linux"))]
pub fn detect_total_memory() -> u64 {
    fallback_memory()
}

/// Assumed memory when detection is unsupported or fails: 8 GiB.
const fn fallback_memory() -> u64 {
    8 * 1024 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn detection_reports_a_usable_host() {
        let info = SystemInfo::detect();
        assert!(info.cpu_cores >= 1);
        assert!(info.total_memory > 0);
    }

    #[test]
    fn budget_recommendation_is_four_fifths_of_memory() {
        assert_eq!(recommended_memory_budget(10 * GIB), 8 * GIB);
        assert_eq!(recommended_memory_budget(0), 0);
    }

    #[test]
    fn clamp_keeps_small_budgets_and_caps_large_ones() {
        let info = SystemInfo {
            cpu_cores: 8,
            total_memory: 10 * GIB,
            gpu: None,
        };
        assert_eq!(info.clamp_budget(4 * GIB), 4 * GIB);
        assert_eq!(info.clamp_budget(20 * GIB), 8 * GIB);
        assert_eq!(info.gpu_display(), "none");
    }
}
