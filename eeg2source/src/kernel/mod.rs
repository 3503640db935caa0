//! Source localization kernels.
//!
//! A kernel projects scalp-channel data onto the 68-region cortical
//! atlas. The expensive half is building the inverse operator for a
//! montage; applying it to a recording is a dense matrix product. Both
//! halves are deterministic: the same montage, channel count, and
//! regularization always yield the same operator, and the same operator
//! on the same samples always yields the same time-courses. That
//! determinism is what makes operator and result caching sound.

pub mod gpu;
pub mod minimum_norm;
pub mod operator;
pub mod regions;

use thiserror::Error;

use crate::io::tensor::{EpochTensor, RegionTimeSeries};

pub use gpu::{GpuBackendKind, GpuBackendSelect};
pub use minimum_norm::MinimumNormKernel;
pub use operator::{InverseOperator, OperatorCodecError};
pub use regions::{region_index, DESIKAN_KILLIANY_68, REGION_COUNT};

/// Errors from operator construction or application.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("unknown montage \"{montage}\"")]
    UnknownMontage { montage: String },

    #[error("montage \"{montage}\" expects {expected} channels, recording has {actual}")]
    MontageMismatch {
        montage: String,
        expected: usize,
        actual: usize,
    },

    #[error("operator for \"{montage}\" is ill-conditioned: {reason}")]
    IllConditioned { montage: String, reason: String },

    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },
}

/// A named montage and the channel count it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MontageSpec {
    pub name: &'static str,
    pub n_channels: usize,
}

/// Montages the engine knows how to localize from.
pub static KNOWN_MONTAGES: [MontageSpec; 5] = [
    MontageSpec {
        name: "GSN-HydroCel-129",
        n_channels: 129,
    },
    MontageSpec {
        name: "GSN-HydroCel-128",
        n_channels: 128,
    },
    MontageSpec {
        name: "biosemi64",
        n_channels: 64,
    },
    MontageSpec {
        name: "biosemi128",
        n_channels: 128,
    },
    MontageSpec {
        name: "standard_1020",
        n_channels: 94,
    },
];

/// Look up a montage by name.
pub fn montage_by_name(name: &str) -> Option<&'static MontageSpec> {
    KNOWN_MONTAGES
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(name))
}

/// First known montage matching a channel count. Used by the relaxed
/// montage retry to re-guess from the data when the declared montage
/// disagrees with it.
pub fn montage_for_channels(n_channels: usize) -> Option<&'static MontageSpec> {
    KNOWN_MONTAGES.iter().find(|m| m.n_channels == n_channels)
}

/// Validate that `montage` names a known montage matching `n_channels`.
pub fn check_montage(montage: &str, n_channels: usize) -> Result<&'static MontageSpec, KernelError> {
    let spec = montage_by_name(montage).ok_or_else(|| KernelError::UnknownMontage {
        montage: montage.to_string(),
    })?;
    if spec.n_channels != n_channels {
        return Err(KernelError::MontageMismatch {
            montage: spec.name.to_string(),
            expected: spec.n_channels,
            actual: n_channels,
        });
    }
    Ok(spec)
}

/// Localization backend seam.
///
/// Implementations must be deterministic. `build_operator` may be slow;
/// `apply` must not mutate shared state so concurrent application from
/// multiple jobs is safe.
pub trait LocalizationKernel: Send + Sync + 'static {
    /// Kernel name for operator cache keys and logs.
    fn name(&self) -> &str;

    /// Build the inverse operator for a montage at the given channel
    /// count and regularization.
    ///
    /// `n_channels` may be below the montage's nominal count when
    /// channels were dropped by the quality retry.
    fn build_operator(
        &self,
        montage: &MontageSpec,
        n_channels: usize,
        lambda2: f64,
    ) -> Result<InverseOperator, KernelError>;

    /// Project a recording through the operator.
    fn apply(
        &self,
        operator: &InverseOperator,
        tensor: &EpochTensor,
    ) -> Result<RegionTimeSeries, KernelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn montage_lookup_is_case_insensitive() {
        assert_eq!(montage_by_name("gsn-hydrocel-129").map(|m| m.n_channels), Some(129));
        assert_eq!(montage_by_name("BIOSEMI64").map(|m| m.n_channels), Some(64));
        assert!(montage_by_name("neuroscan32").is_none());
    }

    #[test]
    fn channel_count_resolves_first_match() {
        assert_eq!(montage_for_channels(129).map(|m| m.name), Some("GSN-HydroCel-129"));
        // 128 is ambiguous; table order picks the EGI net.
        assert_eq!(montage_for_channels(128).map(|m| m.name), Some("GSN-HydroCel-128"));
        assert!(montage_for_channels(7).is_none());
    }

    #[test]
    fn check_montage_flags_count_disagreement() {
        assert!(check_montage("biosemi64", 64).is_ok());
        let err = check_montage("biosemi64", 129).unwrap_err();
        assert!(matches!(
            err,
            KernelError::MontageMismatch {
                expected: 64,
                actual: 129,
                ..
            }
        ));
        let err = check_montage("nope", 64).unwrap_err();
        assert!(matches!(err, KernelError::UnknownMontage { .. }));
    }
}
