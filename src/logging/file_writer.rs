//! Diagnostics output with tracing integration
//!
//! Installs the tracing subscriber for the server's own messages, writing to
//! stderr or, when configured, appending to a file shared by all threads.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::DiagnosticsConfig;

/// A writer that appends to a shared diagnostics file
pub struct SharedFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.file.lock() {
            Ok(mut file) => {
                file.write_all(buf)?;
                Ok(buf.len())
            }
            // A poisoned lock means another thread panicked mid-line; drop this one
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Ok(mut file) = self.file.lock() {
            file.flush()
        } else {
            Ok(())
        }
    }
}

/// Writer factory for tracing-subscriber
#[derive(Clone)]
pub struct SharedFileWriterMaker {
    file: Arc<Mutex<File>>,
}

impl SharedFileWriterMaker {
    /// Open (or create) `path` for appending, creating parent directories
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create diagnostics directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open diagnostics file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl<'a> MakeWriter<'a> for SharedFileWriterMaker {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            file: Arc::clone(&self.file),
        }
    }
}

/// Guard that keeps the diagnostics file open
pub struct LoggingGuard {
    /// Diagnostics file, if not logging to stderr
    pub path: Option<PathBuf>,
    _file: Option<SharedFileWriterMaker>,
}

/// Build the filter: RUST_LOG wins, otherwise the configured directive
pub fn build_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("lumberjack=info"))
}

/// Initialize diagnostics logging
///
/// Returns a guard that must be kept alive for the duration of logging.
pub fn init_logging(config: &DiagnosticsConfig) -> Result<LoggingGuard> {
    let env_filter = build_filter(&config.level);

    match &config.file {
        Some(path) => {
            let writer = SharedFileWriterMaker::open(path)?;

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer.clone())
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .try_init()
                .context("Failed to install tracing subscriber")?;

            Ok(LoggingGuard {
                path: Some(path.clone()),
                _file: Some(writer),
            })
        }
        None => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .try_init()
                .context("Failed to install tracing subscriber")?;

            Ok(LoggingGuard {
                path: None,
                _file: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shared_writer_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("lumberjack.log");
        let maker = SharedFileWriterMaker::open(&path).unwrap();

        maker.make_writer().write_all(b"first\n").unwrap();
        maker.make_writer().write_all(b"second\n").unwrap();
        maker.make_writer().flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_reopen_does_not_truncate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lumberjack.log");
        fs::write(&path, "existing\n").unwrap();

        let maker = SharedFileWriterMaker::open(&path).unwrap();
        maker.make_writer().write_all(b"more\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "existing\nmore\n");
    }

    #[test]
    fn test_bad_directive_falls_back() {
        // Must not panic on a directive EnvFilter cannot parse
        let _ = build_filter("lumberjack=[[[");
    }
}
