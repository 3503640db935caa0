//! In-memory containers for epoched sensor data and region time series.
//!
//! An [`EpochTensor`] is the loaded form of one recording: `f32` samples in
//! (epoch, channel, sample) order. A [`RegionTimeSeries`] is the localized
//! output: (region, sample, epoch) order, matching the on-disk NPY shape.

use thiserror::Error;

/// A tensor whose declared dimensions disagree with its payload length.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("tensor shape mismatch: {n_channels}ch x {n_epochs}ep x {n_samples}sa needs {expected} values, got {actual}")]
pub struct TensorShapeError {
    pub n_channels: usize,
    pub n_epochs: usize,
    pub n_samples: usize,
    pub expected: usize,
    pub actual: usize,
}

/// Epoched sensor data: `data[(epoch * n_channels + channel) * n_samples + sample]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochTensor {
    pub n_channels: usize,
    pub n_epochs: usize,
    pub n_samples: usize,
    /// Sampling rate of `data` in Hz.
    pub sfreq_hz: f64,
    data: Vec<f32>,
}

impl EpochTensor {
    /// Wrap a flat sample buffer, checking the declared shape.
    pub fn from_vec(
        n_channels: usize,
        n_epochs: usize,
        n_samples: usize,
        sfreq_hz: f64,
        data: Vec<f32>,
    ) -> Result<Self, TensorShapeError> {
        let expected = n_channels * n_epochs * n_samples;
        if data.len() != expected {
            return Err(TensorShapeError {
                n_channels,
                n_epochs,
                n_samples,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            n_channels,
            n_epochs,
            n_samples,
            sfreq_hz,
            data,
        })
    }

    /// One channel of one epoch as a contiguous slice.
    pub fn channel(&self, epoch: usize, channel: usize) -> &[f32] {
        let start = (epoch * self.n_channels + channel) * self.n_samples;
        &self.data[start..start + self.n_samples]
    }

    /// Raw sample buffer.
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    /// Payload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Resample every channel to `target_hz` by linear interpolation.
    ///
    /// Deterministic: identical input always yields identical output, which
    /// the cache relies on. A target equal to the current rate is a no-op
    /// clone.
    pub fn resampled(&self, target_hz: f64) -> EpochTensor {
        if (target_hz - self.sfreq_hz).abs() < f64::EPSILON {
            return self.clone();
        }

        let ratio = target_hz / self.sfreq_hz;
        let out_samples = ((self.n_samples as f64) * ratio).round().max(1.0) as usize;
        let mut out = Vec::with_capacity(self.n_channels * self.n_epochs * out_samples);

        for epoch in 0..self.n_epochs {
            for channel in 0..self.n_channels {
                let src = self.channel(epoch, channel);
                for i in 0..out_samples {
                    // Position of output sample i on the source time axis.
                    let pos = (i as f64) * (self.n_samples as f64 - 1.0)
                        / (out_samples as f64 - 1.0).max(1.0);
                    let lo = pos.floor() as usize;
                    let hi = (lo + 1).min(self.n_samples - 1);
                    let frac = (pos - lo as f64) as f32;
                    out.push(src[lo] * (1.0 - frac) + src[hi] * frac);
                }
            }
        }

        EpochTensor {
            n_channels: self.n_channels,
            n_epochs: self.n_epochs,
            n_samples: out_samples,
            sfreq_hz: target_hz,
            data: out,
        }
    }

    /// Copy of this tensor with the given channels removed.
    ///
    /// Used by the cleaning retry to drop flagged channels. Indices out of
    /// range are ignored; the result keeps the original channel order.
    pub fn without_channels(&self, exclude: &[usize]) -> EpochTensor {
        let keep: Vec<usize> = (0..self.n_channels)
            .filter(|c| !exclude.contains(c))
            .collect();
        let mut out = Vec::with_capacity(keep.len() * self.n_epochs * self.n_samples);
        for epoch in 0..self.n_epochs {
            for &channel in &keep {
                out.extend_from_slice(self.channel(epoch, channel));
            }
        }
        EpochTensor {
            n_channels: keep.len(),
            n_epochs: self.n_epochs,
            n_samples: self.n_samples,
            sfreq_hz: self.sfreq_hz,
            data: out,
        }
    }
}

/// Localized output: `data[(region * n_samples + sample) * n_epochs + epoch]`.
///
/// Region order follows the fixed atlas table; the shape matches the
/// `(n_regions, n_samples, n_epochs)` NPY artifact written per recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTimeSeries {
    pub n_regions: usize,
    pub n_samples: usize,
    pub n_epochs: usize,
    data: Vec<f32>,
}

impl RegionTimeSeries {
    /// Allocate a zeroed series for accumulation.
    pub fn zeroed(n_regions: usize, n_samples: usize, n_epochs: usize) -> Self {
        Self {
            n_regions,
            n_samples,
            n_epochs,
            data: vec![0.0; n_regions * n_samples * n_epochs],
        }
    }

    /// Wrap a flat buffer, checking the declared shape.
    pub fn from_vec(
        n_regions: usize,
        n_samples: usize,
        n_epochs: usize,
        data: Vec<f32>,
    ) -> Result<Self, TensorShapeError> {
        let expected = n_regions * n_samples * n_epochs;
        if data.len() != expected {
            return Err(TensorShapeError {
                n_channels: n_regions,
                n_epochs,
                n_samples,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            n_regions,
            n_samples,
            n_epochs,
            data,
        })
    }

    pub fn value(&self, region: usize, sample: usize, epoch: usize) -> f32 {
        self.data[(region * self.n_samples + sample) * self.n_epochs + epoch]
    }

    pub fn set(&mut self, region: usize, sample: usize, epoch: usize, value: f32) {
        self.data[(region * self.n_samples + sample) * self.n_epochs + epoch] = value;
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Copy `chunk`'s epochs into this series starting at `epoch_offset`.
    ///
    /// Chunked processing localizes epoch sub-batches independently and
    /// stitches them back together here.
    pub fn merge_epochs(&mut self, chunk: &RegionTimeSeries, epoch_offset: usize) {
        debug_assert_eq!(self.n_regions, chunk.n_regions);
        debug_assert_eq!(self.n_samples, chunk.n_samples);
        debug_assert!(epoch_offset + chunk.n_epochs <= self.n_epochs);

        for region in 0..chunk.n_regions {
            for sample in 0..chunk.n_samples {
                for epoch in 0..chunk.n_epochs {
                    let v = chunk.value(region, sample, epoch);
                    self.set(region, sample, epoch_offset + epoch, v);
                }
            }
        }
    }
}
