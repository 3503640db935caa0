//! Cache statistics tracking and reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters updated on the cache's hot paths.
#[derive(Debug, Default)]
pub struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub waits: AtomicU64,
    pub wait_timeouts: AtomicU64,
    pub publishes: AtomicU64,
    pub evictions: AtomicU64,
    pub corrupt_drops: AtomicU64,
}

impl CacheCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time cache statistics for monitoring and the CLI.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found another worker already computing the artifact.
    pub waits: u64,
    /// Waits that gave up and recomputed.
    pub wait_timeouts: u64,
    pub publishes: u64,
    pub evictions: u64,
    /// Entries dropped because their bytes failed to read back.
    pub corrupt_drops: u64,
    pub entry_count: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
}

impl CacheStats {
    /// Hit rate over all lookups (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub(crate) fn from_counters(
        counters: &CacheCounters,
        entry_count: usize,
        total_bytes: u64,
        max_bytes: u64,
    ) -> Self {
        Self {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            waits: counters.waits.load(Ordering::Relaxed),
            wait_timeouts: counters.wait_timeouts.load(Ordering::Relaxed),
            publishes: counters.publishes.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            corrupt_drops: counters.corrupt_drops.load(Ordering::Relaxed),
            entry_count,
            total_bytes,
            max_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_handles_empty_and_mixed_counts() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.hits = 3;
        stats.misses = 1;
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_copies_all_counters() {
        let counters = CacheCounters::default();
        CacheCounters::bump(&counters.hits);
        CacheCounters::bump(&counters.hits);
        CacheCounters::bump(&counters.misses);
        CacheCounters::bump(&counters.evictions);

        let stats = CacheStats::from_counters(&counters, 5, 1024, 4096);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entry_count, 5);
        assert_eq!(stats.total_bytes, 1024);
        assert_eq!(stats.max_bytes, 4096);
    }
}
