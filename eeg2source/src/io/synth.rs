//! Synthetic epoched recordings for trials, benchmarks, and tests.

use std::io::Write;
use std::path::Path;

use serde_json::json;

use super::reader::{companion_path, Recording, RecordingMeta};
use super::tensor::EpochTensor;

/// Deterministic generator state. splitmix64 keeps fixtures reproducible
/// across platforms without pulling in an RNG crate.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn unit_noise(state: &mut u64) -> f32 {
    // Uniform in [-1, 1).
    (splitmix64(state) >> 40) as f32 / (1u64 << 23) as f32 * 2.0 - 1.0
}

/// Generate a plausible scalp recording: per-channel alpha-band sinusoid
/// plus low-amplitude noise, scaled to microvolt-range values.
pub fn generate(
    n_channels: usize,
    n_epochs: usize,
    n_samples: usize,
    sfreq_hz: f64,
    montage: Option<&str>,
    seed: u64,
) -> Recording {
    let mut state = seed.wrapping_mul(0x2545_f491_4f6c_dd1d) ^ 0x6a09_e667_f3bc_c909;
    let mut data = Vec::with_capacity(n_channels * n_epochs * n_samples);

    for epoch in 0..n_epochs {
        for channel in 0..n_channels {
            let freq = 8.0 + (channel % 5) as f64;
            let phase = unit_noise(&mut state) as f64 * std::f64::consts::PI;
            for sample in 0..n_samples {
                let t = sample as f64 / sfreq_hz;
                let wave = (2.0 * std::f64::consts::PI * freq * t + phase).sin();
                let drift = (epoch as f64 * 0.1).sin() * 0.2;
                let noise = unit_noise(&mut state) as f64 * 0.3;
                data.push(((wave + drift + noise) * 20e-6) as f32);
            }
        }
    }

    let tensor = EpochTensor::from_vec(n_channels, n_epochs, n_samples, sfreq_hz, data)
        .expect("generated data matches its dimensions");

    Recording {
        meta: RecordingMeta {
            source: std::path::PathBuf::new(),
            n_channels,
            n_epochs,
            n_samples,
            sfreq_hz,
            montage: montage.map(str::to_string),
        },
        tensor,
    }
}

/// Write `recording` as a `.set`/`.fdt` pair at `set_path`.
pub fn write_pair(set_path: &Path, recording: &Recording) -> std::io::Result<()> {
    let meta = &recording.meta;
    let header = json!({
        "n_channels": meta.n_channels,
        "n_epochs": meta.n_epochs,
        "n_samples": meta.n_samples,
        "sfreq_hz": meta.sfreq_hz,
        "montage": meta.montage,
    });
    std::fs::write(set_path, serde_json::to_string_pretty(&header)?)?;

    let mut fdt = std::io::BufWriter::new(std::fs::File::create(companion_path(set_path))?);
    for value in recording.tensor.samples() {
        fdt.write_all(&value.to_le_bytes())?;
    }
    fdt.flush()
}
