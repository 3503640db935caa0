//! In-memory index over the artifact directory.
//!
//! Tracks size, recency, and pin counts per key so eviction can pick
//! least-recently-used victims without scanning the filesystem. The
//! index is ephemeral: rebuilt from disk at startup (file mtime seeds
//! the recency), then kept in sync by the store on every publish, hit,
//! and eviction. Pinned entries are in active use by a running job and
//! are never offered as eviction candidates.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;

/// Filename extension for stored artifacts.
const ARTIFACT_EXT: &str = ".artifact";

/// Per-entry bookkeeping.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub size_bytes: u64,
    pub last_accessed: Instant,
    pub pins: u32,
}

/// An unpinned entry eligible for eviction.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub key: String,
    pub size_bytes: u64,
    pub last_accessed: Instant,
}

/// Result of rebuilding the index from disk.
#[derive(Debug, Default)]
pub struct RebuildStats {
    pub files_indexed: u64,
    pub skipped: u64,
    pub total_bytes: u64,
}

/// Concurrent artifact index.
#[derive(Debug)]
pub struct ArtifactIndex {
    entries: DashMap<String, EntryMeta>,
    total_bytes: AtomicU64,
    directory: PathBuf,
}

impl ArtifactIndex {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            entries: DashMap::new(),
            total_bytes: AtomicU64::new(0),
            directory,
        }
    }

    /// Record a published artifact with one pin held by the publisher.
    /// Re-publishing an existing key updates its size and adds a pin on
    /// top of any pins readers already hold.
    pub fn record_pinned(&self, key: &str, size: u64) {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let old_size = occupied.get().size_bytes;
                let meta = occupied.get_mut();
                meta.size_bytes = size;
                meta.last_accessed = Instant::now();
                meta.pins += 1;
                if size >= old_size {
                    self.total_bytes.fetch_add(size - old_size, Ordering::Relaxed);
                } else {
                    self.total_bytes.fetch_sub(old_size - size, Ordering::Relaxed);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(EntryMeta {
                    size_bytes: size,
                    last_accessed: Instant::now(),
                    pins: 1,
                });
                self.total_bytes.fetch_add(size, Ordering::Relaxed);
            }
        }
    }

    /// Pin an entry, refreshing its recency. Returns its size, or `None`
    /// if the key is not indexed.
    pub fn pin(&self, key: &str) -> Option<u64> {
        self.entries.get_mut(key).map(|mut entry| {
            entry.pins += 1;
            entry.last_accessed = Instant::now();
            entry.size_bytes
        })
    }

    /// Release one pin.
    pub fn unpin(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.pins = entry.pins.saturating_sub(1);
        }
    }

    /// Drop an entry from the index, returning its metadata.
    pub fn remove(&self, key: &str) -> Option<EntryMeta> {
        let (_, meta) = self.entries.remove(key)?;
        self.total_bytes.fetch_sub(meta.size_bytes, Ordering::Relaxed);
        Some(meta)
    }

    /// Drop an entry only if nobody holds a pin on it. The check and the
    /// removal are one atomic operation, so a reader that pinned between
    /// candidate selection and eviction keeps its entry.
    pub fn remove_if_unpinned(&self, key: &str) -> Option<EntryMeta> {
        let (_, meta) = self.entries.remove_if(key, |_, meta| meta.pins == 0)?;
        self.total_bytes.fetch_sub(meta.size_bytes, Ordering::Relaxed);
        Some(meta)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Unpinned entries, oldest first, up to `limit`.
    pub fn eviction_candidates(&self, limit: usize) -> Vec<EvictionCandidate> {
        let mut candidates: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.value().pins == 0)
            .map(|entry| EvictionCandidate {
                key: entry.key().clone(),
                size_bytes: entry.value().size_bytes,
                last_accessed: entry.value().last_accessed,
            })
            .collect();
        candidates.sort_by_key(|c| c.last_accessed);
        candidates.truncate(limit);
        candidates
    }

    /// All keys currently indexed.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// On-disk path for a key.
    pub fn key_path(&self, key: &str) -> PathBuf {
        self.directory.join(key_to_filename(key))
    }

    /// Rebuild from the artifact directory. Pins start at zero; mtime
    /// stands in for last access.
    pub async fn rebuild_from_disk(&self) -> std::io::Result<RebuildStats> {
        let mut stats = RebuildStats::default();
        if !self.directory.exists() {
            return Ok(stats);
        }

        let mut dir = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let meta = match tokio::fs::metadata(&path).await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let key = match path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(filename_to_key)
            {
                Some(k) => k,
                None => {
                    stats.skipped += 1;
                    continue;
                }
            };

            let last_accessed = meta
                .modified()
                .ok()
                .and_then(|mtime| {
                    let age = mtime.elapsed().ok()?;
                    Instant::now().checked_sub(age)
                })
                .unwrap_or_else(Instant::now);

            let size = meta.len();
            self.entries.insert(
                key,
                EntryMeta {
                    size_bytes: size,
                    last_accessed,
                    pins: 0,
                },
            );
            self.total_bytes.fetch_add(size, Ordering::Relaxed);
            stats.files_indexed += 1;
            stats.total_bytes += size;

            if stats.files_indexed % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }

        tracing::debug!(
            files = stats.files_indexed,
            skipped = stats.skipped,
            total_bytes = stats.total_bytes,
            "artifact index rebuilt"
        );
        Ok(stats)
    }
}

/// `op:abcd...` -> `op_abcd....artifact`
pub fn key_to_filename(key: &str) -> String {
    format!("{}{ARTIFACT_EXT}", key.replace(':', "_"))
}

/// Reverse of [`key_to_filename`].
pub fn filename_to_key(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(ARTIFACT_EXT)?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.replace('_', ":"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn index() -> ArtifactIndex {
        ArtifactIndex::new(PathBuf::from("/tmp/artifacts"))
    }

    #[test]
    fn record_and_remove_keep_totals_consistent() {
        let idx = index();
        idx.record_pinned("op:aaaa", 100);
        idx.record_pinned("res:bbbb", 400);
        assert_eq!(idx.total_bytes(), 500);
        assert_eq!(idx.entry_count(), 2);

        // Re-publishing the same key replaces, not accumulates.
        idx.record_pinned("op:aaaa", 150);
        assert_eq!(idx.total_bytes(), 550);
        assert_eq!(idx.entry_count(), 2);

        let removed = idx.remove("res:bbbb").unwrap();
        assert_eq!(removed.size_bytes, 400);
        assert_eq!(idx.total_bytes(), 150);
    }

    #[test]
    fn pinned_entries_are_not_candidates() {
        let idx = index();
        idx.record_pinned("op:aaaa", 100); // pins = 1
        idx.record_pinned("op:bbbb", 100);
        idx.unpin("op:bbbb"); // pins = 0

        let candidates = idx.eviction_candidates(10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key, "op:bbbb");

        idx.unpin("op:aaaa");
        assert_eq!(idx.eviction_candidates(10).len(), 2);
    }

    #[test]
    fn candidates_come_oldest_first() {
        let idx = index();
        idx.record_pinned("op:old", 1);
        idx.unpin("op:old");
        std::thread::sleep(Duration::from_millis(10));
        idx.record_pinned("op:new", 1);
        idx.unpin("op:new");

        let candidates = idx.eviction_candidates(10);
        assert_eq!(candidates[0].key, "op:old");

        // Pinning refreshes recency.
        idx.pin("op:old");
        idx.unpin("op:old");
        let candidates = idx.eviction_candidates(10);
        assert_eq!(candidates[0].key, "op:new");
    }

    #[test]
    fn pin_is_refused_for_unknown_keys() {
        let idx = index();
        assert_eq!(idx.pin("op:nope"), None);
        idx.unpin("op:nope"); // must not panic
    }

    #[test]
    fn conditional_remove_respects_pins() {
        let idx = index();
        idx.record_pinned("res:cccc", 200);
        assert!(idx.remove_if_unpinned("res:cccc").is_none());
        assert_eq!(idx.total_bytes(), 200);

        idx.unpin("res:cccc");
        let removed = idx.remove_if_unpinned("res:cccc").unwrap();
        assert_eq!(removed.size_bytes, 200);
        assert_eq!(idx.total_bytes(), 0);
    }

    #[test]
    fn republish_stacks_pins_instead_of_clobbering() {
        let idx = index();
        idx.record_pinned("op:dddd", 100); // publisher A, pins = 1
        idx.record_pinned("op:dddd", 100); // publisher B, pins = 2
        idx.unpin("op:dddd");
        // One holder remains, still not evictable.
        assert!(idx.remove_if_unpinned("op:dddd").is_none());
        idx.unpin("op:dddd");
        assert!(idx.remove_if_unpinned("op:dddd").is_some());
    }

    #[test]
    fn filenames_round_trip() {
        let name = key_to_filename("op:abcd1234");
        assert_eq!(name, "op_abcd1234.artifact");
        assert_eq!(filename_to_key(&name), Some("op:abcd1234".to_string()));
        assert_eq!(filename_to_key("junk.txt"), None);
        assert_eq!(filename_to_key(".artifact"), None);
    }

    #[tokio::test]
    async fn rebuild_indexes_artifacts_and_skips_noise() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("op_aaaa.artifact"), vec![0u8; 64]).unwrap();
        std::fs::write(dir.path().join("res_bbbb.artifact"), vec![0u8; 32]).unwrap();
        std::fs::write(dir.path().join("stray.tmp"), b"x").unwrap();

        let idx = ArtifactIndex::new(dir.path().to_path_buf());
        let stats = idx.rebuild_from_disk().await.unwrap();

        assert_eq!(stats.files_indexed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(idx.total_bytes(), 96);
        assert!(idx.contains("op:aaaa"));
        assert!(idx.contains("res:bbbb"));
        // Rebuilt entries are unpinned and evictable.
        assert_eq!(idx.eviction_candidates(10).len(), 2);
    }
}
