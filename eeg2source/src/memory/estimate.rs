//! Working-set estimation and epoch chunk planning.
//!
//! Estimates are deliberately coarse: sample payload times a backend
//! multiplier that covers the decoded tensor, kernel workspace, and the
//! result buffer. Overshooting wastes a little admission headroom;
//! undershooting risks the OOM killer, so the multipliers round up.

use std::ops::Range;

use crate::io::reader::RecordingMeta;
use crate::kernel::regions::REGION_COUNT;

/// CPU backends hold input, workspace, and output copies.
pub const CPU_WORKSPACE_MULTIPLIER: f64 = 3.0;

/// GPU adds a host-side staging copy on top of the CPU working set.
pub const GPU_WORKSPACE_MULTIPLIER: f64 = 4.0;

/// Raw sample payload for a recording shape.
pub fn estimate_tensor_bytes(n_channels: usize, n_epochs: usize, n_samples: usize) -> u64 {
    (n_channels as u64) * (n_epochs as u64) * (n_samples as u64) * 4
}

/// Result buffer size for a recording shape.
pub fn estimate_region_bytes(n_samples: usize, n_epochs: usize) -> u64 {
    (REGION_COUNT as u64) * (n_samples as u64) * (n_epochs as u64) * 4
}

/// Full working-set estimate for processing `meta` on a backend with the
/// given multiplier.
pub fn estimate_working_set(meta: &RecordingMeta, multiplier: f64) -> u64 {
    let payload = estimate_tensor_bytes(meta.n_channels, meta.n_epochs, meta.n_samples);
    (payload as f64 * multiplier).ceil() as u64
}

/// How a recording's epochs split into admissible chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub n_epochs: usize,
    pub epochs_per_chunk: usize,
}

impl ChunkPlan {
    pub fn n_chunks(&self) -> usize {
        self.n_epochs.div_ceil(self.epochs_per_chunk)
    }

    /// Epoch ranges in processing order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let per = self.epochs_per_chunk;
        let total = self.n_epochs;
        (0..self.n_chunks()).map(move |i| (i * per)..((i + 1) * per).min(total))
    }
}

/// Plan epoch chunks so that `fixed_bytes` (output buffer, operator)
/// plus one chunk of `per_epoch_bytes` fits inside `limit`.
///
/// Returns `None` when even a single epoch cannot fit, in which case
/// the recording is genuinely too large for the budget.
pub fn plan_epoch_chunks(
    n_epochs: usize,
    per_epoch_bytes: u64,
    fixed_bytes: u64,
    limit: u64,
) -> Option<ChunkPlan> {
    if n_epochs == 0 || per_epoch_bytes == 0 {
        return None;
    }
    let headroom = limit.checked_sub(fixed_bytes)?;
    let epochs_per_chunk = ((headroom / per_epoch_bytes) as usize).min(n_epochs);
    if epochs_per_chunk == 0 {
        return None;
    }
    Some(ChunkPlan {
        n_epochs,
        epochs_per_chunk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn meta(n_channels: usize, n_epochs: usize, n_samples: usize) -> RecordingMeta {
        RecordingMeta {
            source: PathBuf::from("test.set"),
            n_channels,
            n_epochs,
            n_samples,
            sfreq_hz: 250.0,
            montage: None,
        }
    }

    #[test]
    fn estimates_scale_with_shape_and_multiplier() {
        let m = meta(129, 10, 500);
        assert_eq!(estimate_tensor_bytes(129, 10, 500), 2_580_000);
        assert_eq!(
            estimate_working_set(&m, CPU_WORKSPACE_MULTIPLIER),
            7_740_000
        );
        assert_eq!(
            estimate_working_set(&m, GPU_WORKSPACE_MULTIPLIER),
            10_320_000
        );
        assert_eq!(estimate_region_bytes(500, 10), 68 * 500 * 10 * 4);
    }

    #[test]
    fn chunk_plan_covers_every_epoch_once() {
        let plan = plan_epoch_chunks(10, 100, 50, 350).unwrap();
        assert_eq!(plan.epochs_per_chunk, 3);
        assert_eq!(plan.n_chunks(), 4);

        let ranges: Vec<_> = plan.ranges().collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..10]);
    }

    #[test]
    fn plan_is_single_chunk_when_everything_fits() {
        let plan = plan_epoch_chunks(4, 10, 0, 1000).unwrap();
        assert_eq!(plan.epochs_per_chunk, 4);
        assert_eq!(plan.n_chunks(), 1);
        assert_eq!(plan.ranges().collect::<Vec<_>>(), vec![0..4]);
    }

    #[test]
    fn impossible_plans_are_refused() {
        // Fixed overhead alone exceeds the limit.
        assert_eq!(plan_epoch_chunks(10, 100, 500, 400), None);
        // One epoch does not fit the headroom.
        assert_eq!(plan_epoch_chunks(10, 100, 350, 400), None);
        // Degenerate shapes.
        assert_eq!(plan_epoch_chunks(0, 100, 0, 400), None);
    }
}
