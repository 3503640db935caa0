//! Content-addressed artifact caching.
//!
//! Two artifact kinds flow through the store: serialized inverse
//! operators, reusable across every recording that shares a montage and
//! regularization, and per-recording localization results, reusable when
//! the same input is reprocessed. Keys derive from content, lookup
//! coalesces concurrent computation of the same key, and eviction is
//! least-recently-used with in-use entries held immune.

pub mod index;
pub mod key;
pub mod stats;
pub mod store;

pub use key::{content_digest, operator_key, result_key, ArtifactKey, ArtifactKind};
pub use stats::CacheStats;
pub use store::{ArtifactCache, ArtifactHandle, CacheError, CacheOutcome, ComputeClaim};
