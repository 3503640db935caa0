//! GPU backend detection and device scheduling.
//!
//! No vendor SDK is linked; availability is probed from the machine
//! (NVIDIA device nodes for CUDA, the platform for Metal) and can be
//! forced through `EEG2SOURCE_GPU` for trials and tests. A probed device
//! is driven through a [`DeviceQueue`], which admits one kernel at a
//! time the way a single compute stream would.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::KernelError;

/// Environment override for GPU detection: `cuda`, `metal`, or `none`.
pub const GPU_ENV_OVERRIDE: &str = "EEG2SOURCE_GPU";

/// Which GPU backend the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuBackendSelect {
    /// Probe CUDA first, then Metal.
    #[default]
    Auto,
    Cuda,
    Metal,
}

impl FromStr for GpuBackendSelect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cuda" => Ok(Self::Cuda),
            "metal" => Ok(Self::Metal),
            other => Err(format!(
                "unknown gpu backend \"{other}\" (expected auto, cuda, or metal)"
            )),
        }
    }
}

impl fmt::Display for GpuBackendSelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cuda => write!(f, "cuda"),
            Self::Metal => write!(f, "metal"),
        }
    }
}

/// A backend that probing actually found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuBackendKind {
    Cuda,
    Metal,
}

impl GpuBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Metal => "metal",
        }
    }
}

impl fmt::Display for GpuBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe for a usable GPU backend.
pub fn probe(select: GpuBackendSelect) -> Result<GpuBackendKind, KernelError> {
    let overridden = std::env::var(GPU_ENV_OVERRIDE).ok();
    resolve(select, overridden.as_deref(), cuda_present(), metal_present())
}

/// Detection logic, separated from the machine so tests can exercise
/// every combination.
fn resolve(
    select: GpuBackendSelect,
    env_override: Option<&str>,
    cuda: bool,
    metal: bool,
) -> Result<GpuBackendKind, KernelError> {
    let (cuda, metal) = match env_override.map(str::to_ascii_lowercase).as_deref() {
        Some("cuda") => (true, false),
        Some("metal") => (false, true),
        Some("none") | Some("off") => (false, false),
        _ => (cuda, metal),
    };

    let unavailable = |reason: &str| KernelError::BackendUnavailable {
        backend: "gpu".to_string(),
        reason: reason.to_string(),
    };

    match select {
        GpuBackendSelect::Auto => {
            if cuda {
                Ok(GpuBackendKind::Cuda)
            } else if metal {
                Ok(GpuBackendKind::Metal)
            } else {
                Err(unavailable("no CUDA device node and not a Metal platform"))
            }
        }
        GpuBackendSelect::Cuda => {
            if cuda {
                Ok(GpuBackendKind::Cuda)
            } else {
                Err(unavailable("no CUDA device node found"))
            }
        }
        GpuBackendSelect::Metal => {
            if metal {
                Ok(GpuBackendKind::Metal)
            } else {
                Err(unavailable("Metal requires macOS"))
            }
        }
    }
}

fn cuda_present() -> bool {
    Path::new("/dev/nvidia0").exists() || Path::new("/proc/driver/nvidia").exists()
}

fn metal_present() -> bool {
    cfg!(target_os = "macos")
}

/// Serializes kernel launches on one device.
///
/// The compute itself runs on the blocking pool; the queue guarantees
/// only one launch is in flight, matching a single device stream, so two
/// GPU jobs never contend for device memory mid-kernel.
#[derive(Debug)]
pub struct DeviceQueue {
    backend: GpuBackendKind,
    lock: tokio::sync::Mutex<()>,
}

impl DeviceQueue {
    pub fn new(backend: GpuBackendKind) -> Self {
        Self {
            backend,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn backend(&self) -> GpuBackendKind {
        self.backend
    }

    /// Run `work` with exclusive device access, waiting at most `wait`
    /// for the device to free. A queue that stays busy past the bound is
    /// reported as unavailable so the caller can fall back to a CPU
    /// backend instead of stalling.
    pub async fn submit<T, F>(&self, wait: Duration, work: F) -> Result<T, KernelError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _guard = tokio::time::timeout(wait, self.lock.lock())
            .await
            .map_err(|_| KernelError::BackendUnavailable {
                backend: self.backend.as_str().to_string(),
                reason: format!("device still busy after {wait:?}"),
            })?;
        Ok(tokio::task::spawn_blocking(work)
            .await
            .expect("device task panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn select_parses_and_displays() {
        assert_eq!("auto".parse::<GpuBackendSelect>().unwrap(), GpuBackendSelect::Auto);
        assert_eq!("CUDA".parse::<GpuBackendSelect>().unwrap(), GpuBackendSelect::Cuda);
        assert_eq!("Metal".parse::<GpuBackendSelect>().unwrap(), GpuBackendSelect::Metal);
        assert!("opencl".parse::<GpuBackendSelect>().is_err());
        assert_eq!(GpuBackendSelect::Cuda.to_string(), "cuda");
    }

    #[test]
    fn auto_prefers_cuda_over_metal() {
        assert_eq!(
            resolve(GpuBackendSelect::Auto, None, true, true).unwrap(),
            GpuBackendKind::Cuda
        );
        assert_eq!(
            resolve(GpuBackendSelect::Auto, None, false, true).unwrap(),
            GpuBackendKind::Metal
        );
        assert!(resolve(GpuBackendSelect::Auto, None, false, false).is_err());
    }

    #[test]
    fn named_backend_must_be_present() {
        assert!(resolve(GpuBackendSelect::Cuda, None, false, true).is_err());
        assert_eq!(
            resolve(GpuBackendSelect::Metal, None, false, true).unwrap(),
            GpuBackendKind::Metal
        );
    }

    #[test]
    fn env_override_wins_over_detection() {
        assert_eq!(
            resolve(GpuBackendSelect::Auto, Some("cuda"), false, false).unwrap(),
            GpuBackendKind::Cuda
        );
        let err = resolve(GpuBackendSelect::Auto, Some("none"), true, true).unwrap_err();
        assert!(matches!(err, KernelError::BackendUnavailable { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queue_admits_one_launch_at_a_time() {
        let queue = Arc::new(DeviceQueue::new(GpuBackendKind::Cuda));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                queue
                    .submit(Duration::from_secs(5), move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(10));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_device_reports_unavailable() {
        let queue = Arc::new(DeviceQueue::new(GpuBackendKind::Cuda));

        let hog = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .submit(Duration::from_secs(5), || {
                        std::thread::sleep(Duration::from_millis(200));
                    })
                    .await
                    .unwrap();
            })
        };
        // Give the hog time to take the device.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = queue.submit(Duration::from_millis(10), || ()).await.unwrap_err();
        assert!(matches!(err, KernelError::BackendUnavailable { .. }));
        hog.await.unwrap();
    }
}
