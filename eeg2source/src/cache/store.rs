//! Content-addressed artifact store with single-flight computation.
//!
//! Lookup follows claim-then-publish: the first worker to miss a key
//! claims it and computes; later workers asking for the same key wait on
//! the claim instead of duplicating the work. Publishing writes the
//! artifact atomically (temp file + rename), indexes it, wakes every
//! waiter, and releases the claim. A claim dropped without publishing
//! wakes the waiters too, and the first to re-check inherits the miss.
//! Waiters that outlive their patience recompute on their own; because
//! keys are content-addressed, a duplicate publish writes identical
//! bytes and last-rename-wins is harmless.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Notify;

use super::index::ArtifactIndex;
use super::key::ArtifactKey;
use super::stats::{CacheCounters, CacheStats};

/// Distinguishes concurrent publishers' temp files.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// How many eviction candidates to examine per sweep pass.
const EVICTION_BATCH: usize = 32;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("artifact cache i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a lookup.
#[derive(Debug)]
pub enum CacheOutcome {
    /// The artifact exists; the handle pins it while in use.
    Hit(ArtifactHandle),
    /// The caller must compute and publish (or drop the claim).
    Miss(ComputeClaim),
}

#[derive(Debug)]
struct CacheInner {
    directory: PathBuf,
    max_bytes: u64,
    index: ArtifactIndex,
    claims: DashMap<String, Arc<Notify>>,
    counters: CacheCounters,
}

/// Shared artifact cache. Clones are cheap and refer to the same store.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    inner: Arc<CacheInner>,
}

impl ArtifactCache {
    /// Open (or create) the store at `directory`, rebuilding the index
    /// from artifacts left by earlier runs.
    pub async fn open(directory: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CacheError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;
        sweep_temp_files(&directory).await?;

        let index = ArtifactIndex::new(directory.clone());
        let rebuilt = index.rebuild_from_disk().await?;
        tracing::debug!(
            directory = %directory.display(),
            entries = rebuilt.files_indexed,
            bytes = rebuilt.total_bytes,
            "artifact cache opened"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                directory,
                max_bytes,
                index,
                claims: DashMap::new(),
                counters: CacheCounters::default(),
            }),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn max_bytes(&self) -> u64 {
        self.inner.max_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats::from_counters(
            &self.inner.counters,
            self.inner.index.entry_count(),
            self.inner.index.total_bytes(),
            self.inner.max_bytes,
        )
    }

    /// Look up `key`, claiming it for computation on a miss.
    ///
    /// When another worker holds the claim this waits up to
    /// `claim_wait` for the publish, then returns a hit. On claim
    /// timeout the caller gets a non-exclusive miss and computes
    /// independently.
    pub async fn get_or_claim(&self, key: &ArtifactKey, claim_wait: Duration) -> CacheOutcome {
        use dashmap::mapref::entry::Entry;

        let key_s = key.to_string();
        loop {
            if let Some(handle) = self.try_read_pinned(&key_s).await {
                CacheCounters::bump(&self.inner.counters.hits);
                return CacheOutcome::Hit(handle);
            }

            let notify = match self.inner.claims.entry(key_s.clone()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::new(Notify::new()));
                    CacheCounters::bump(&self.inner.counters.misses);
                    tracing::debug!(key = %key.short(), "artifact miss, claimed");
                    return CacheOutcome::Miss(ComputeClaim {
                        key: key_s,
                        inner: Arc::clone(&self.inner),
                        exclusive: true,
                        done: false,
                    });
                }
                Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            };

            CacheCounters::bump(&self.inner.counters.waits);
            tracing::debug!(key = %key.short(), "artifact claimed elsewhere, waiting");
            if tokio::time::timeout(claim_wait, notify.notified()).await.is_err() {
                CacheCounters::bump(&self.inner.counters.wait_timeouts);
                CacheCounters::bump(&self.inner.counters.misses);
                tracing::warn!(
                    key = %key.short(),
                    waited = ?claim_wait,
                    "claim holder stalled, recomputing independently"
                );
                return CacheOutcome::Miss(ComputeClaim {
                    key: key_s,
                    inner: Arc::clone(&self.inner),
                    exclusive: false,
                    done: false,
                });
            }
            // Woken by a publish or an aborted claim; either way re-check.
        }
    }

    /// Pin the entry and read its bytes. Unreadable entries are dropped
    /// so the caller falls through to a fresh claim.
    async fn try_read_pinned(&self, key: &str) -> Option<ArtifactHandle> {
        self.inner.index.pin(key)?;
        let path = self.inner.index.key_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(ArtifactHandle {
                key: key.to_string(),
                bytes,
                inner: Arc::clone(&self.inner),
            }),
            Err(e) => {
                self.inner.index.unpin(key);
                self.inner.index.remove(key);
                let _ = tokio::fs::remove_file(&path).await;
                CacheCounters::bump(&self.inner.counters.corrupt_drops);
                tracing::warn!(key, error = %e, "cached artifact unreadable, dropped");
                None
            }
        }
    }

    /// Drop an artifact whose decoded content turned out to be invalid.
    /// The next lookup will miss and recompute.
    pub async fn invalidate(&self, key: &ArtifactKey) {
        let key_s = key.to_string();
        if self.inner.index.remove(&key_s).is_some() {
            CacheCounters::bump(&self.inner.counters.corrupt_drops);
        }
        let _ = tokio::fs::remove_file(self.inner.index.key_path(&key_s)).await;
        tracing::warn!(key = %key.short(), "artifact invalidated");
    }

    /// Delete every unpinned artifact. Returns (entries, bytes) removed.
    pub async fn clear(&self) -> Result<(usize, u64), CacheError> {
        let mut entries = 0usize;
        let mut bytes = 0u64;
        for key in self.inner.index.keys() {
            if let Some(meta) = self.inner.index.remove_if_unpinned(&key) {
                let _ = tokio::fs::remove_file(self.inner.index.key_path(&key)).await;
                entries += 1;
                bytes += meta.size_bytes;
            }
        }
        tracing::info!(entries, bytes, "artifact cache cleared");
        Ok((entries, bytes))
    }
}

impl CacheInner {
    /// Evict least-recently-used unpinned entries until the store fits
    /// its budget. Entries under an active claim are left alone. When
    /// everything left is in use the store stays over budget and says so.
    async fn evict_to_fit(&self) {
        while self.index.total_bytes() > self.max_bytes {
            let candidates = self.index.eviction_candidates(EVICTION_BATCH);
            let mut evicted = false;

            for candidate in candidates {
                if self.index.total_bytes() <= self.max_bytes {
                    return;
                }
                if self.claims.contains_key(&candidate.key) {
                    continue;
                }
                if self.index.remove_if_unpinned(&candidate.key).is_some() {
                    let _ = tokio::fs::remove_file(self.index.key_path(&candidate.key)).await;
                    CacheCounters::bump(&self.counters.evictions);
                    tracing::debug!(
                        key = %candidate.key,
                        bytes = candidate.size_bytes,
                        "artifact evicted"
                    );
                    evicted = true;
                }
            }

            if !evicted {
                tracing::warn!(
                    total = self.index.total_bytes(),
                    max = self.max_bytes,
                    "cache over budget but every entry is pinned or claimed"
                );
                return;
            }
        }
    }

    fn release_claim(&self, key: &str) {
        if let Some((_, notify)) = self.claims.remove(key) {
            notify.notify_waiters();
        }
    }
}

/// Remove temp files a crashed publisher left behind. Renamed artifacts
/// are never affected; only `.tmp` files can be mid-write debris.
async fn sweep_temp_files(directory: &Path) -> std::io::Result<()> {
    let mut swept = 0u64;
    let mut dir = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        let is_temp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tmp"));
        if is_temp && tokio::fs::remove_file(&path).await.is_ok() {
            swept += 1;
        }
    }
    if swept > 0 {
        tracing::debug!(swept, directory = %directory.display(), "stale temp files removed");
    }
    Ok(())
}

/// A pinned, loaded artifact. The pin holds off eviction until dropped.
#[derive(Debug)]
pub struct ArtifactHandle {
    key: String,
    bytes: Vec<u8>,
    inner: Arc<CacheInner>,
}

impl ArtifactHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for ArtifactHandle {
    fn drop(&mut self) {
        self.inner.index.unpin(&self.key);
    }
}

/// The right to compute and publish one artifact.
#[derive(Debug)]
pub struct ComputeClaim {
    key: String,
    inner: Arc<CacheInner>,
    exclusive: bool,
    done: bool,
}

impl ComputeClaim {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store the computed bytes, wake waiters, and return a pinned
    /// handle over the published artifact.
    pub async fn publish(mut self, bytes: Vec<u8>) -> Result<ArtifactHandle, CacheError> {
        let final_path = self.inner.index.key_path(&self.key);
        let temp_path = final_path.with_extension(format!(
            "{}.tmp",
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &final_path).await?;

        self.inner.index.record_pinned(&self.key, bytes.len() as u64);
        CacheCounters::bump(&self.inner.counters.publishes);
        tracing::debug!(key = %self.key, bytes = bytes.len(), "artifact published");

        self.inner.evict_to_fit().await;

        self.done = true;
        if self.exclusive {
            self.inner.release_claim(&self.key);
        }

        Ok(ArtifactHandle {
            key: self.key.clone(),
            bytes,
            inner: Arc::clone(&self.inner),
        })
    }
}

impl Drop for ComputeClaim {
    fn drop(&mut self) {
        if !self.done && self.exclusive {
            tracing::debug!(key = %self.key, "claim aborted without publish");
            self.inner.release_claim(&self.key);
        }
    }
}
