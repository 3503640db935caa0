//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use std::time::Duration;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false")),
    }
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [processing] section
    if let Some(section) = ini.section(Some("processing")) {
        if let Some(v) = section.get("montage") {
            let v = v.trim();
            if !v.is_empty() {
                config.processing.montage = v.to_string();
            }
        }
        if let Some(v) = section.get("resample_hz") {
            let hz: f64 = v
                .trim()
                .parse()
                .map_err(|_| invalid("processing", "resample_hz", v, "expected a number"))?;
            if !(hz > 0.0) {
                return Err(invalid("processing", "resample_hz", v, "must be positive"));
            }
            config.processing.resample_hz = hz;
        }
        if let Some(v) = section.get("lambda2") {
            let lambda2: f64 = v
                .trim()
                .parse()
                .map_err(|_| invalid("processing", "lambda2", v, "expected a number"))?;
            if !(lambda2 > 0.0) {
                return Err(invalid("processing", "lambda2", v, "must be positive"));
            }
            config.processing.lambda2 = lambda2;
        }
        if let Some(v) = section.get("backend") {
            config.processing.backend = v.trim().parse().map_err(|_| {
                invalid(
                    "processing",
                    "backend",
                    v,
                    "must be one of: sequential, parallel, gpu",
                )
            })?;
        }
        if let Some(v) = section.get("gpu_backend") {
            config.processing.gpu_backend = v.trim().parse().map_err(|_| {
                invalid(
                    "processing",
                    "gpu_backend",
                    v,
                    "must be one of: auto, cuda, metal",
                )
            })?;
        }
        if let Some(v) = section.get("workers") {
            let workers: usize = v
                .trim()
                .parse()
                .map_err(|_| invalid("processing", "workers", v, "expected a count"))?;
            if workers == 0 {
                return Err(invalid("processing", "workers", v, "must be at least 1"));
            }
            config.processing.workers = workers;
        }
    }

    // [memory] section
    if let Some(section) = ini.section(Some("memory")) {
        if let Some(v) = section.get("budget") {
            config.memory.budget = parse_size(v).map_err(|_| {
                invalid(
                    "memory",
                    "budget",
                    v,
                    "expected format like '4GB', '512MB', or a byte count",
                )
            })?;
        }
        if let Some(v) = section.get("admission_timeout_secs") {
            let secs: u64 = v
                .trim()
                .parse()
                .map_err(|_| invalid("memory", "admission_timeout_secs", v, "expected seconds"))?;
            config.memory.admission_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = section.get("chunked") {
            config.memory.chunked = parse_bool("memory", "chunked", v)?;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("enabled") {
            config.cache.enabled = parse_bool("cache", "enabled", v)?;
        }
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.cache.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("max_size") {
            config.cache.max_size = parse_size(v).map_err(|_| {
                invalid(
                    "cache",
                    "max_size",
                    v,
                    "expected format like '10GB', '500MB', or a byte count",
                )
            })?;
        }
        if let Some(v) = section.get("results") {
            config.cache.results = parse_bool("cache", "results", v)?;
        }
    }

    // [robust] section
    if let Some(section) = ini.section(Some("robust")) {
        if let Some(v) = section.get("enabled") {
            config.robust.enabled = parse_bool("robust", "enabled", v)?;
        }
        if let Some(v) = section.get("relaxed_montage") {
            config.robust.relaxed_montage = parse_bool("robust", "relaxed_montage", v)?;
        }
        if let Some(v) = section.get("clean_channels") {
            config.robust.clean_channels = parse_bool("robust", "clean_channels", v)?;
        }
        if let Some(v) = section.get("chunked_retry") {
            config.robust.chunked_retry = parse_bool("robust", "chunked_retry", v)?;
        }
    }

    Ok(config)
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(path)
}
