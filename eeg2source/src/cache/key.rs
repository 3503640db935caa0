//! Content-addressed artifact keys.
//!
//! Keys are SHA-256 digests over every input that shapes the artifact,
//! prefixed with the artifact kind. Two jobs that would produce the same
//! bytes always derive the same key; any parameter that changes the
//! output changes the key. Collisions are not a practical concern at
//! this digest width.

use std::fmt;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::io::reader::companion_path;

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A serialized inverse operator.
    Operator,
    /// Region time-courses for one recording.
    Result,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "op",
            Self::Result => "res",
        }
    }
}

/// A cache key: kind prefix plus content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub kind: ArtifactKind,
    pub digest: String,
}

impl ArtifactKey {
    pub fn new(kind: ArtifactKind, digest: String) -> Self {
        Self { kind, digest }
    }

    /// Abbreviated digest for logs.
    pub fn short(&self) -> String {
        format!("{}:{}", self.kind.as_str(), &self.digest[..12.min(self.digest.len())])
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.digest)
    }
}

/// Key for an inverse operator.
///
/// Folds in everything [`build_operator`] reads: kernel name, montage,
/// effective channel count, regularization, and atlas revision.
///
/// [`build_operator`]: crate::kernel::LocalizationKernel::build_operator
pub fn operator_key(
    kernel: &str,
    montage: &str,
    n_channels: usize,
    lambda2: f64,
    atlas_version: &str,
) -> ArtifactKey {
    let mut hasher = Sha256::new();
    hasher.update(b"operator\0");
    hasher.update(kernel.as_bytes());
    hasher.update([0]);
    hasher.update(montage.as_bytes());
    hasher.update([0]);
    hasher.update((n_channels as u64).to_le_bytes());
    hasher.update(lambda2.to_bits().to_le_bytes());
    hasher.update(atlas_version.as_bytes());
    ArtifactKey::new(ArtifactKind::Operator, hex::encode(hasher.finalize()))
}

/// Key for a localization result.
///
/// Depends on the operator that produced it, the input bytes, the target
/// sampling rate, and any channels dropped before projection.
pub fn result_key(
    operator: &ArtifactKey,
    input_digest: &str,
    resample_hz: f64,
    dropped_channels: &[usize],
) -> ArtifactKey {
    let mut hasher = Sha256::new();
    hasher.update(b"result\0");
    hasher.update(operator.digest.as_bytes());
    hasher.update([0]);
    hasher.update(input_digest.as_bytes());
    hasher.update([0]);
    hasher.update(resample_hz.to_bits().to_le_bytes());
    for channel in dropped_channels {
        hasher.update((*channel as u64).to_le_bytes());
    }
    ArtifactKey::new(ArtifactKind::Result, hex::encode(hasher.finalize()))
}

/// Digest the content of a `.set`/`.fdt` pair.
///
/// Streams both files so multi-gigabyte companions never sit in memory
/// just to be hashed.
pub fn content_digest(set_path: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    digest_file(&mut hasher, set_path)?;

    let fdt = companion_path(set_path);
    if fdt.exists() {
        digest_file(&mut hasher, &fdt)?;
    }
    Ok(hex::encode(hasher.finalize()))
}

fn digest_file(hasher: &mut Sha256, path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}
