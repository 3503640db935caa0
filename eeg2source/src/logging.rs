//! Logging setup: console output, optional log file.
//!
//! The console layer prints compact single-line events for batch
//! progress; the optional file layer records full detail for later
//! inspection. `RUST_LOG` overrides the configured level when set.

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keep this alive for as long as logging runs; dropping it flushes and
/// closes the log file writer.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Default log file name inside a log directory.
pub fn default_log_file_name() -> &'static str {
    "eeg2source.log"
}

/// Initialize the global subscriber.
///
/// `level` is the default filter (e.g. `"info"`, `"eeg2source=debug"`);
/// the `RUST_LOG` environment variable takes precedence when present.
/// When `log_file` is given, its parent directory is created and the
/// file is truncated for the new session.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<LoggingGuard, io::Error> {
    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let name = path.file_name().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("log file path has no file name: {}", path.display()),
                )
            })?;
            fs::create_dir_all(dir)?;
            // Start each session with a fresh file.
            fs::write(path, "")?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Console events go to stderr so stdout stays free for tables and
    // JSON output.
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber can only be installed once per process, so
    // these cover the file handling around it rather than init itself.

    #[test]
    fn default_file_name_is_stable() {
        assert_eq!(default_log_file_name(), "eeg2source.log");
    }

    #[test]
    fn session_start_truncates_an_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("eeg2source.log");

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "old session data").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old session data");

        fs::write(&path, "").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn guard_holds_the_writer_open() {
        let (writer, guard) = tracing_appender::non_blocking(io::sink());
        drop(writer);
        let _logging_guard = LoggingGuard {
            _file_guard: Some(guard),
        };
    }
}
