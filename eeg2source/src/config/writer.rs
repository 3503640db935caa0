//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented representation written to `config.ini`.

use super::settings::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[processing]
; Electrode montage the recordings are expected to use.
; Known layouts: GSN-HydroCel-129, GSN-HydroCel-128, biosemi64, biosemi128, standard_1020
montage = {montage}
; Target sampling rate in Hz; recordings are resampled before localization.
resample_hz = {resample_hz}
; Inverse-solution regularization (1/SNR^2). 0.111111 corresponds to SNR 3.
lambda2 = {lambda2}
; Execution backend: sequential, parallel, or gpu
backend = {backend}
; Accelerator selection for the gpu backend: auto, cuda, or metal
gpu_backend = {gpu_backend}
; Worker count for the parallel and gpu backends
workers = {workers}

[memory]
; Budget for concurrently admitted jobs. Supports KB/MB/GB suffixes.
budget = {budget}
; Seconds a job may wait for admission before failing as memory-exceeded.
admission_timeout_secs = {admission_timeout_secs}
; Process recordings in epoch chunks when a whole recording exceeds the budget.
chunked = {chunked}

[cache]
; Consult the operator cache before computing inverse operators.
enabled = {cache_enabled}
; Directory holding cached artifacts.
directory = {cache_directory}
; Ceiling before least-recently-used entries are evicted.
max_size = {cache_max_size}
; Also cache final per-recording results (keyed by content digest).
results = {cache_results}

[robust]
; Classify failures and retry per-category before giving up on a file.
enabled = {robust_enabled}
; Retry montage mismatches once, accepting the recording's channel layout.
relaxed_montage = {relaxed_montage}
; Retry data-quality failures once with flagged channels excluded.
clean_channels = {clean_channels}
; Retry memory-exceeded failures once in chunked mode.
chunked_retry = {chunked_retry}
"#,
        montage = config.processing.montage,
        resample_hz = config.processing.resample_hz,
        lambda2 = config.processing.lambda2,
        backend = config.processing.backend,
        gpu_backend = config.processing.gpu_backend,
        workers = config.processing.workers,
        budget = format_size(config.memory.budget),
        admission_timeout_secs = config.memory.admission_timeout.as_secs(),
        chunked = config.memory.chunked,
        cache_enabled = config.cache.enabled,
        cache_directory = config.cache.directory.display(),
        cache_max_size = format_size(config.cache.max_size),
        cache_results = config.cache.results,
        robust_enabled = config.robust.enabled,
        relaxed_montage = config.robust.relaxed_montage,
        clean_channels = config.robust.clean_channels,
        chunked_retry = config.robust.chunked_retry,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_string_parses_back() {
        let config = ConfigFile::default();
        let content = to_config_string(&config);

        let ini = ini::Ini::load_from_str(&content).unwrap();
        let parsed = super::super::parser::parse_ini(&ini).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn sections_are_present() {
        let content = to_config_string(&ConfigFile::default());
        for section in ["[processing]", "[memory]", "[cache]", "[robust]"] {
            assert!(content.contains(section), "missing {section}");
        }
    }
}
