//! Memory budget admission control.
//!
//! Every job reserves its estimated working-set before it loads a single
//! sample. The budget is a semaphore holding one permit per mebibyte;
//! a reservation acquires its rounded-up share and releases it when the
//! [`MemoryGrant`] drops, so the sum of admitted estimates can never
//! exceed the configured budget. Jobs whose estimate exceeds the whole
//! budget are rejected up front and must fall back to chunked
//! processing; jobs that merely cannot fit *right now* wait, bounded by
//! the admission timeout.

pub mod estimate;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::format_size;

pub use estimate::{
    estimate_region_bytes, estimate_tensor_bytes, estimate_working_set, plan_epoch_chunks,
    ChunkPlan, CPU_WORKSPACE_MULTIPLIER, GPU_WORKSPACE_MULTIPLIER,
};

/// Permit granularity. Estimates are rounded up to whole mebibytes.
pub const PERMIT_BYTES: u64 = 1024 * 1024;

/// Errors from budget admission.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(
        "estimated working-set {} exceeds the memory budget {}",
        format_size(*requested),
        format_size(*budget)
    )]
    ExceedsBudget { requested: u64, budget: u64 },

    #[error(
        "timed out after {waited:?} waiting to admit {} (budget {})",
        format_size(*requested),
        format_size(*budget)
    )]
    AdmissionTimeout {
        requested: u64,
        budget: u64,
        waited: Duration,
    },
}

/// Budget-wide admission gate. Cheap to share via `Arc`.
#[derive(Debug)]
pub struct MemoryManager {
    budget: u64,
    capacity_permits: usize,
    semaphore: Arc<Semaphore>,
    in_use_permits: Arc<AtomicUsize>,
    peak_permits: Arc<AtomicUsize>,
}

impl MemoryManager {
    /// Create a manager for `budget` bytes. Budgets below one permit are
    /// rounded up so the manager always admits at least one small job.
    pub fn new(budget: u64) -> Self {
        let capacity_permits = (budget.div_ceil(PERMIT_BYTES) as usize).max(1);
        Self {
            budget,
            capacity_permits,
            semaphore: Arc::new(Semaphore::new(capacity_permits)),
            in_use_permits: Arc::new(AtomicUsize::new(0)),
            peak_permits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configured budget in bytes.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Bytes currently reserved by live grants.
    pub fn in_use(&self) -> u64 {
        self.in_use_permits.load(Ordering::Relaxed) as u64 * PERMIT_BYTES
    }

    /// High-water mark of reserved bytes.
    pub fn peak(&self) -> u64 {
        self.peak_permits.load(Ordering::Relaxed) as u64 * PERMIT_BYTES
    }

    /// Bytes still available for admission.
    pub fn available(&self) -> u64 {
        self.semaphore.available_permits() as u64 * PERMIT_BYTES
    }

    pub fn reset_peak(&self) {
        self.peak_permits.store(0, Ordering::Relaxed);
    }

    fn permits_for(&self, bytes: u64) -> usize {
        (bytes.div_ceil(PERMIT_BYTES) as usize).max(1)
    }

    /// Reserve `bytes`, waiting up to `timeout` for earlier grants to
    /// release. Requests larger than the whole budget fail immediately
    /// with [`MemoryError::ExceedsBudget`] since waiting could never
    /// satisfy them.
    pub async fn reserve(&self, bytes: u64, timeout: Duration) -> Result<MemoryGrant, MemoryError> {
        let permits = self.permits_for(bytes);
        if permits > self.capacity_permits {
            return Err(MemoryError::ExceedsBudget {
                requested: bytes,
                budget: self.budget,
            });
        }

        let acquired = tokio::time::timeout(
            timeout,
            Arc::clone(&self.semaphore).acquire_many_owned(permits as u32),
        )
        .await
        .map_err(|_| MemoryError::AdmissionTimeout {
            requested: bytes,
            budget: self.budget,
            waited: timeout,
        })?
        .expect("budget semaphore closed");

        Ok(self.grant(acquired, permits, bytes))
    }

    /// Reserve without waiting. `None` when the budget cannot cover the
    /// request right now.
    pub fn try_reserve(&self, bytes: u64) -> Option<MemoryGrant> {
        let permits = self.permits_for(bytes);
        if permits > self.capacity_permits {
            return None;
        }
        let acquired = Arc::clone(&self.semaphore)
            .try_acquire_many_owned(permits as u32)
            .ok()?;
        Some(self.grant(acquired, permits, bytes))
    }

    fn grant(&self, permit: OwnedSemaphorePermit, permits: usize, bytes: u64) -> MemoryGrant {
        let current = self.in_use_permits.fetch_add(permits, Ordering::Relaxed) + permits;
        let mut peak = self.peak_permits.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_permits.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }

        tracing::trace!(
            bytes,
            in_use = current as u64 * PERMIT_BYTES,
            budget = self.budget,
            "memory reserved"
        );

        MemoryGrant {
            _permit: permit,
            permits,
            bytes,
            in_use_permits: Arc::clone(&self.in_use_permits),
        }
    }
}

/// A live reservation. Dropping it returns the bytes to the budget.
#[derive(Debug)]
pub struct MemoryGrant {
    _permit: OwnedSemaphorePermit,
    permits: usize,
    bytes: u64,
    in_use_permits: Arc<AtomicUsize>,
}

impl MemoryGrant {
    /// Bytes the caller asked for (before permit rounding).
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Bytes actually held against the budget.
    pub fn reserved_bytes(&self) -> u64 {
        self.permits as u64 * PERMIT_BYTES
    }
}

impl Drop for MemoryGrant {
    fn drop(&mut self) {
        self.in_use_permits.fetch_sub(self.permits, Ordering::Relaxed);
    }
}
