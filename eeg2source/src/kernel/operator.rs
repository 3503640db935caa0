//! Inverse operator representation and on-disk codec.
//!
//! An operator is a dense `n_regions x n_channels` weight matrix plus the
//! parameters it was built from. Cached operators are stored as a small
//! binary container: an 8-byte magic, a format version, a JSON parameter
//! header, then the weight payload as little-endian `f32`. The JSON
//! header keeps the format self-describing without a schema registry;
//! the magic and version keep stale or foreign files out of the cache.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::KernelError;
use crate::io::tensor::{EpochTensor, RegionTimeSeries};

const MAGIC: &[u8; 8] = b"E2SINVOP";
const FORMAT_VERSION: u32 = 1;

/// Errors decoding a stored operator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperatorCodecError {
    #[error("not an inverse operator file (bad magic)")]
    Magic,

    #[error("unsupported operator format version {0}")]
    Version(u32),

    #[error("malformed operator header: {0}")]
    Header(String),

    #[error("operator file truncated: expected {expected} payload bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
}

#[derive(Debug, Serialize, Deserialize)]
struct OperatorHeader {
    montage: String,
    n_channels: usize,
    n_regions: usize,
    lambda2: f64,
    kernel: String,
}

/// A built inverse operator.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseOperator {
    pub montage: String,
    pub n_channels: usize,
    pub n_regions: usize,
    pub lambda2: f64,
    /// Name of the kernel that built it.
    pub kernel: String,
    /// Row-major `n_regions x n_channels`.
    weights: Vec<f32>,
}

impl InverseOperator {
    pub fn new(
        montage: impl Into<String>,
        n_channels: usize,
        n_regions: usize,
        lambda2: f64,
        kernel: impl Into<String>,
        weights: Vec<f32>,
    ) -> Result<Self, KernelError> {
        let montage = montage.into();
        if weights.len() != n_regions * n_channels {
            return Err(KernelError::IllConditioned {
                montage,
                reason: format!(
                    "weight matrix has {} values, expected {}x{}",
                    weights.len(),
                    n_regions,
                    n_channels
                ),
            });
        }
        Ok(Self {
            montage,
            n_channels,
            n_regions,
            lambda2,
            kernel: kernel.into(),
            weights,
        })
    }

    /// Weight row for one region.
    pub fn row(&self, region: usize) -> &[f32] {
        let start = region * self.n_channels;
        &self.weights[start..start + self.n_channels]
    }

    /// In-memory footprint of the weight matrix.
    pub fn byte_len(&self) -> usize {
        self.weights.len() * std::mem::size_of::<f32>()
    }

    /// Project `tensor` through the operator.
    ///
    /// Pure function of its inputs; safe to call concurrently from many
    /// jobs sharing one operator.
    pub fn apply(&self, tensor: &EpochTensor) -> Result<RegionTimeSeries, KernelError> {
        if tensor.n_channels != self.n_channels {
            return Err(KernelError::MontageMismatch {
                montage: self.montage.clone(),
                expected: self.n_channels,
                actual: tensor.n_channels,
            });
        }

        let mut out = RegionTimeSeries::zeroed(self.n_regions, tensor.n_samples, tensor.n_epochs);
        let mut acc = vec![0.0f32; tensor.n_samples];

        for epoch in 0..tensor.n_epochs {
            for region in 0..self.n_regions {
                acc.fill(0.0);
                let row = self.row(region);
                for channel in 0..tensor.n_channels {
                    let w = row[channel];
                    for (a, &v) in acc.iter_mut().zip(tensor.channel(epoch, channel)) {
                        *a += w * v;
                    }
                }
                for (sample, &a) in acc.iter().enumerate() {
                    out.set(region, sample, epoch, a);
                }
            }
        }

        Ok(out)
    }

    /// Encode for cache storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = OperatorHeader {
            montage: self.montage.clone(),
            n_channels: self.n_channels,
            n_regions: self.n_regions,
            lambda2: self.lambda2,
            kernel: self.kernel.clone(),
        };
        let header_json =
            serde_json::to_vec(&header).expect("operator header serializes to JSON");

        let mut out =
            Vec::with_capacity(MAGIC.len() + 8 + header_json.len() + self.weights.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_json);
        for w in &self.weights {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Decode a cached operator.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OperatorCodecError> {
        if bytes.len() < MAGIC.len() + 8 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(OperatorCodecError::Magic);
        }

        let mut at = MAGIC.len();
        let version = u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        if version != FORMAT_VERSION {
            return Err(OperatorCodecError::Version(version));
        }
        at += 4;
        let header_len =
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize;
        at += 4;

        let header_end = at
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| OperatorCodecError::Header("header overruns file".to_string()))?;
        let header: OperatorHeader = serde_json::from_slice(&bytes[at..header_end])
            .map_err(|e| OperatorCodecError::Header(e.to_string()))?;

        let expected = header.n_regions * header.n_channels * 4;
        let payload = &bytes[header_end..];
        if payload.len() != expected {
            return Err(OperatorCodecError::Truncated {
                expected,
                actual: payload.len(),
            });
        }

        let mut weights = Vec::with_capacity(header.n_regions * header.n_channels);
        for chunk in payload.chunks_exact(4) {
            weights.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        Ok(Self {
            montage: header.montage,
            n_channels: header.n_channels,
            n_regions: header.n_regions,
            lambda2: header.lambda2,
            kernel: header.kernel,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_operator() -> InverseOperator {
        // 2 regions x 3 channels
        InverseOperator::new(
            "biosemi64",
            3,
            2,
            1.0 / 9.0,
            "minimum-norm",
            vec![1.0, 0.0, 0.0, 0.0, 0.5, 0.5],
        )
        .unwrap()
    }

    #[test]
    fn apply_projects_channels_onto_regions() {
        let op = tiny_operator();
        // 1 epoch, 3 channels, 2 samples
        let tensor = EpochTensor::from_vec(
            3,
            1,
            2,
            250.0,
            vec![1.0, 2.0, 10.0, 20.0, 100.0, 200.0],
        )
        .unwrap();

        let out = op.apply(&tensor).unwrap();
        // Region 0 copies channel 0.
        assert_eq!(out.value(0, 0, 0), 1.0);
        assert_eq!(out.value(0, 1, 0), 2.0);
        // Region 1 averages channels 1 and 2.
        assert_eq!(out.value(1, 0, 0), 55.0);
        assert_eq!(out.value(1, 1, 0), 110.0);
    }

    #[test]
    fn apply_rejects_wrong_channel_count() {
        let op = tiny_operator();
        let tensor = EpochTensor::from_vec(2, 1, 2, 250.0, vec![0.0; 4]).unwrap();
        assert!(matches!(
            op.apply(&tensor).unwrap_err(),
            KernelError::MontageMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn codec_round_trips() {
        let op = tiny_operator();
        let decoded = InverseOperator::from_bytes(&op.to_bytes()).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn codec_rejects_foreign_bytes() {
        assert_eq!(
            InverseOperator::from_bytes(b"\x93NUMPY\x01\x00junk"),
            Err(OperatorCodecError::Magic)
        );
    }

    #[test]
    fn codec_rejects_future_version() {
        let mut bytes = tiny_operator().to_bytes();
        bytes[8..12].copy_from_slice(&9u32.to_le_bytes());
        assert_eq!(
            InverseOperator::from_bytes(&bytes),
            Err(OperatorCodecError::Version(9))
        );
    }

    #[test]
    fn codec_rejects_truncated_payload() {
        let bytes = tiny_operator().to_bytes();
        let cut = &bytes[..bytes.len() - 4];
        assert!(matches!(
            InverseOperator::from_bytes(cut),
            Err(OperatorCodecError::Truncated { .. })
        ));
    }

    #[test]
    fn bad_weight_count_is_rejected_at_construction() {
        let err = InverseOperator::new("biosemi64", 3, 2, 0.1, "minimum-norm", vec![0.0; 5])
            .unwrap_err();
        assert!(matches!(err, KernelError::IllConditioned { .. }));
    }
}
