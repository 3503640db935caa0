//! Signal quality screening.
//!
//! Two cheap scans run before localization: flat channels (dead electrode
//! or disconnected lead) and extreme amplitudes (movement artifact,
//! amplifier saturation). Jobs that trip either scan fail with a
//! data-quality error; the robust path may drop the offending channels
//! and retry.

use std::fmt;

use crate::io::tensor::EpochTensor;

/// A channel whose peak-to-peak range across the recording stays below
/// this is considered flat. Volts.
pub const FLAT_PEAK_TO_PEAK: f32 = 1e-12;

/// Any sample with magnitude above this is considered an artifact. Scalp
/// potentials live in the microvolt range; 10 mV is far outside it.
pub const EXTREME_AMPLITUDE: f32 = 1e-2;

/// Outcome of a quality scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QualityReport {
    pub flat_channels: Vec<usize>,
    pub extreme_channels: Vec<usize>,
    pub scanned_channels: usize,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.flat_channels.is_empty() && self.extreme_channels.is_empty()
    }

    /// Union of flat and extreme channels, sorted, deduplicated.
    pub fn offending_channels(&self) -> Vec<usize> {
        let mut all: Vec<usize> = self
            .flat_channels
            .iter()
            .chain(self.extreme_channels.iter())
            .copied()
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    /// True when dropping the offenders would leave too little signal to
    /// localize from.
    pub fn too_few_remaining(&self, minimum: usize) -> bool {
        self.scanned_channels.saturating_sub(self.offending_channels().len()) < minimum
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "clean ({} channels)", self.scanned_channels);
        }
        write!(
            f,
            "{} flat channel(s) {:?}, {} extreme channel(s) {:?} of {}",
            self.flat_channels.len(),
            self.flat_channels,
            self.extreme_channels.len(),
            self.extreme_channels,
            self.scanned_channels
        )
    }
}

/// Streaming per-channel extrema, for scanning a recording one epoch
/// chunk at a time. Folding every chunk of a recording through `update`
/// yields the same report as scanning the whole tensor at once, so
/// chunked and full processing agree on what counts as bad data.
#[derive(Debug)]
pub struct ChannelScan {
    lo: Vec<f32>,
    hi: Vec<f32>,
    extreme: Vec<bool>,
}

impl ChannelScan {
    pub fn new(n_channels: usize) -> Self {
        Self {
            lo: vec![f32::INFINITY; n_channels],
            hi: vec![f32::NEG_INFINITY; n_channels],
            extreme: vec![false; n_channels],
        }
    }

    /// Fold one chunk into the running extrema. The chunk must carry the
    /// full channel set.
    pub fn update(&mut self, tensor: &EpochTensor) {
        debug_assert_eq!(tensor.n_channels, self.lo.len());
        for channel in 0..tensor.n_channels {
            for epoch in 0..tensor.n_epochs {
                for &v in tensor.channel(epoch, channel) {
                    self.lo[channel] = self.lo[channel].min(v);
                    self.hi[channel] = self.hi[channel].max(v);
                    if v.abs() > EXTREME_AMPLITUDE {
                        self.extreme[channel] = true;
                    }
                }
            }
        }
    }

    pub fn finish(self) -> QualityReport {
        let mut report = QualityReport {
            scanned_channels: self.lo.len(),
            ..Default::default()
        };
        for channel in 0..self.lo.len() {
            if self.hi[channel] - self.lo[channel] < FLAT_PEAK_TO_PEAK {
                report.flat_channels.push(channel);
            }
            if self.extreme[channel] {
                report.extreme_channels.push(channel);
            }
        }
        report
    }
}

/// Scan every channel across all epochs.
pub fn scan(tensor: &EpochTensor) -> QualityReport {
    let mut acc = ChannelScan::new(tensor.n_channels);
    acc.update(tensor);
    acc.finish()
}
