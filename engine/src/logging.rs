//! Tracing subscriber setup for the `synchro` binary.
//!
//! Every line is written as `<timestamp> <LEVEL> <message>` with target and
//! span context disabled, so whatever follows the level marker is exactly the
//! event message. `status::parse_log` depends on that shape.

use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use tracing::Subscriber;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::fmt::format::{DefaultFields, Format, Full};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

use crate::error::LoggingError;

/// Timestamp format of every log line.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";
const DEFAULT_FILTER: &str = "info";

/// The formatted layer type produced by [`layer`].
pub type LineLayer<S, W> = fmt::Layer<S, DefaultFields, Format<Full, ChronoLocal>, W>;

/// Where log lines go.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log file; its parent directory is created if needed
    pub log_file: Option<PathBuf>,
    /// Also echo lines to stdout
    pub stdout: bool,
    /// Filter used when `RUST_LOG` is unset or invalid
    pub default_filter: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            log_file: None,
            stdout: true,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LogOptions {
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// Keeps the file writer alive. Dropping it flushes pending lines.
#[derive(Debug)]
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Build the line-formatted layer writing to `make_writer`.
pub fn layer<S, W>(make_writer: W) -> LineLayer<S, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fmt::layer()
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_target(false)
        .with_writer(make_writer)
}

/// Install the global subscriber.
///
/// # Errors
/// Returns LoggingError if the log file cannot be prepared or a global
/// subscriber is already installed.
pub fn init(options: &LogOptions) -> Result<LogGuard, LoggingError> {
    let (file_layer, file_guard) = match &options.log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            (Some(layer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };
    // Colour only when stdout is a terminal
    let stdout_layer = options
        .stdout
        .then(|| layer(io::stdout).with_ansi(io::stdout().is_terminal()));

    let subscriber = Registry::default()
        .with(build_env_filter(&options.default_filter))
        .with(stdout_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &options.log_file {
        tracing::debug!("Logging to {}", path.display());
    }
    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

fn build_env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let Some(file_name) = path.file_name() else {
        return Err(LoggingError::InvalidPath {
            path: path.to_path_buf(),
        });
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
        path: dir.clone(),
        source,
    })?;
    ensure_file_exists(path)?;

    let appender = rolling::never(&dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

fn ensure_file_exists(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// In-memory writer for capturing formatted lines.
    #[derive(Clone, Default)]
    pub(crate) struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a subscriber that formats into the returned buffer.
    pub(crate) fn capture<F: FnOnce()>(f: F) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = Registry::default().with(layer(move || writer.clone()).with_ansi(false));
        tracing::subscriber::with_default(subscriber, f);
        captured.text()
    }

    #[test]
    fn test_line_shape() {
        let text = capture(|| tracing::info!("  Files added: 3"));
        let line = text.lines().next().expect("one line");

        let (stamp, rest) = line.split_at(23);
        assert_eq!(stamp.len(), "2025-01-01 10:00:00,000".len());
        assert_eq!(&stamp[10..11], " ");
        assert_eq!(&stamp[19..20], ",");
        assert!(rest.ends_with(" INFO   Files added: 3"), "line was {:?}", line);
        assert!(!line.contains("synchro_engine"), "target leaked: {:?}", line);
    }

    #[test]
    fn test_file_writer_creates_parent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("logs/nested/run.log");

        let (_writer, _guard) = file_writer(&path).expect("writer");
        assert!(path.is_file());
    }

    #[test]
    fn test_file_writer_rejects_bare_root() {
        let result = file_writer(Path::new("/"));
        assert!(matches!(result, Err(LoggingError::InvalidPath { .. })));
    }

    #[test]
    fn test_default_options() {
        let options = LogOptions::default().with_log_file("x.log");
        assert!(options.stdout);
        assert_eq!(options.default_filter, "info");
        assert_eq!(options.log_file, Some(PathBuf::from("x.log")));
    }
}
