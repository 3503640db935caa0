//! Minimum-norm estimate kernel.
//!
//! Stands in for a full boundary-element forward model: the operator is a
//! deterministic function of montage, channel count, and regularization,
//! generated from a seeded stream and row-normalized so every region row
//! has the same gain. Regularization shrinks the overall gain by
//! `1 / (1 + lambda2)`, mirroring how heavier smoothing damps the
//! estimate. Identical parameters always produce bit-identical operators
//! on every platform, which the operator cache depends on.

use super::operator::InverseOperator;
use super::regions::REGION_COUNT;
use super::{KernelError, LocalizationKernel, MontageSpec};
use crate::io::tensor::{EpochTensor, RegionTimeSeries};

/// Fewer channels than this cannot constrain 68 regions.
pub const MIN_CHANNELS: usize = 8;

/// Deterministic minimum-norm kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumNormKernel;

impl MinimumNormKernel {
    pub fn new() -> Self {
        Self
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Uniform in [-1, 1).
fn unit(state: &mut u64) -> f32 {
    (splitmix64(state) >> 40) as f32 / (1u64 << 23) as f32 * 2.0 - 1.0
}

/// Fold the operator parameters into a per-row seed. FNV-1a over the
/// montage name keeps the stream stable across platforms and runs.
fn row_seed(montage: &str, n_channels: usize, lambda2: f64, region: usize) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in montage.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h ^= n_channels as u64;
    h = h.wrapping_mul(0x0000_0100_0000_01b3);
    h ^= lambda2.to_bits();
    h = h.wrapping_mul(0x0000_0100_0000_01b3);
    h ^= region as u64;
    h.wrapping_mul(0x0000_0100_0000_01b3)
}

impl LocalizationKernel for MinimumNormKernel {
    fn name(&self) -> &str {
        "minimum-norm"
    }

    fn build_operator(
        &self,
        montage: &MontageSpec,
        n_channels: usize,
        lambda2: f64,
    ) -> Result<InverseOperator, KernelError> {
        if !(lambda2 > 0.0) {
            return Err(KernelError::IllConditioned {
                montage: montage.name.to_string(),
                reason: format!("non-positive regularization {lambda2}"),
            });
        }
        if n_channels < MIN_CHANNELS {
            return Err(KernelError::IllConditioned {
                montage: montage.name.to_string(),
                reason: format!("{n_channels} channels cannot constrain {REGION_COUNT} regions"),
            });
        }

        let gain = (1.0 / (1.0 + lambda2)) as f32;
        let mut weights = vec![0.0f32; REGION_COUNT * n_channels];

        for region in 0..REGION_COUNT {
            let mut state = row_seed(montage.name, n_channels, lambda2, region);
            let row = &mut weights[region * n_channels..][..n_channels];

            let mut norm_sq = 0.0f64;
            for w in row.iter_mut() {
                let v = unit(&mut state);
                *w = v;
                norm_sq += f64::from(v) * f64::from(v);
            }
            if norm_sq == 0.0 {
                return Err(KernelError::IllConditioned {
                    montage: montage.name.to_string(),
                    reason: format!("degenerate row for region {region}"),
                });
            }
            let scale = gain / norm_sq.sqrt() as f32;
            for w in row.iter_mut() {
                *w *= scale;
            }
        }

        InverseOperator::new(
            montage.name,
            n_channels,
            REGION_COUNT,
            lambda2,
            self.name(),
            weights,
        )
    }

    fn apply(
        &self,
        operator: &InverseOperator,
        tensor: &EpochTensor,
    ) -> Result<RegionTimeSeries, KernelError> {
        operator.apply(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::montage_by_name;

    fn montage(name: &str) -> &'static MontageSpec {
        montage_by_name(name).unwrap()
    }

    #[test]
    fn identical_parameters_build_identical_operators() {
        let kernel = MinimumNormKernel::new();
        let a = kernel.build_operator(montage("biosemi64"), 64, 1.0 / 9.0).unwrap();
        let b = kernel.build_operator(montage("biosemi64"), 64, 1.0 / 9.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parameters_shape_the_operator() {
        let kernel = MinimumNormKernel::new();
        let base = kernel.build_operator(montage("biosemi64"), 64, 1.0 / 9.0).unwrap();
        let other_montage = kernel
            .build_operator(montage("GSN-HydroCel-128"), 64, 1.0 / 9.0)
            .unwrap();
        let other_lambda = kernel.build_operator(montage("biosemi64"), 64, 0.5).unwrap();

        assert_ne!(base.row(0), other_montage.row(0));
        assert_ne!(base.row(0), other_lambda.row(0));
    }

    #[test]
    fn rows_are_normalized_to_the_regularized_gain() {
        let kernel = MinimumNormKernel::new();
        let lambda2 = 1.0 / 9.0;
        let op = kernel.build_operator(montage("biosemi64"), 64, lambda2).unwrap();

        let expected = 1.0 / (1.0 + lambda2);
        for region in 0..REGION_COUNT {
            let norm: f64 = op
                .row(region)
                .iter()
                .map(|&w| f64::from(w) * f64::from(w))
                .sum::<f64>()
                .sqrt();
            assert!(
                (norm - expected).abs() < 1e-4,
                "region {region} norm {norm} != {expected}"
            );
        }
    }

    #[test]
    fn heavier_regularization_damps_the_gain() {
        let kernel = MinimumNormKernel::new();
        let light = kernel.build_operator(montage("biosemi64"), 64, 0.1).unwrap();
        let heavy = kernel.build_operator(montage("biosemi64"), 64, 1.0).unwrap();

        let norm = |op: &InverseOperator| -> f64 {
            op.row(0).iter().map(|&w| f64::from(w) * f64::from(w)).sum::<f64>().sqrt()
        };
        assert!(norm(&heavy) < norm(&light));
    }

    #[test]
    fn non_positive_regularization_is_ill_conditioned() {
        let kernel = MinimumNormKernel::new();
        for bad in [0.0, -1.0, f64::NAN] {
            let err = kernel.build_operator(montage("biosemi64"), 64, bad).unwrap_err();
            assert!(matches!(err, KernelError::IllConditioned { .. }));
        }
    }

    #[test]
    fn too_few_channels_is_ill_conditioned() {
        let kernel = MinimumNormKernel::new();
        let err = kernel
            .build_operator(montage("biosemi64"), MIN_CHANNELS - 1, 1.0 / 9.0)
            .unwrap_err();
        assert!(matches!(err, KernelError::IllConditioned { .. }));
    }

    #[test]
    fn end_to_end_projection_is_deterministic() {
        let kernel = MinimumNormKernel::new();
        let op = kernel.build_operator(montage("biosemi64"), 64, 1.0 / 9.0).unwrap();
        let recording = crate::io::synth::generate(64, 2, 32, 250.0, None, 17);

        let a = kernel.apply(&op, &recording.tensor).unwrap();
        let b = kernel.apply(&op, &recording.tensor).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_regions, REGION_COUNT);
        assert_eq!(a.n_epochs, 2);
        assert_eq!(a.n_samples, 32);
    }
}
