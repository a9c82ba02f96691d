//! Logging engine
//!
//! Ties together the stream registry, the per-stream rotating files and the
//! retention ledger. Callers hand in a stream name and a message; the engine
//! resolves the stream, formats the entry and appends it to the file for the
//! current time bucket.

pub mod bucket;
pub mod host;
pub mod registry;
pub mod retention;
pub mod stream;

pub use bucket::{BucketTag, TimeBucketPolicy};
pub use registry::{validate_stream_name, StreamRegistry};
pub use retention::{EvictionReport, FileRetentionLedger, RetentionPolicy};
pub use stream::{LogLayout, StreamFile};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use crate::config::Config;
use crate::error::{LogError, LogResult};

/// Settings needed to build a [`LoggingEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub log_directory: PathBuf,
    pub hostname: String,
    pub max_streams: usize,
    pub policy: TimeBucketPolicy,
    pub retention: Option<RetentionPolicy>,
}

/// A single formatted log line: `YYYY-MM-DD HH:MM:SS - stream: message\n`
pub struct LogEntry<'a> {
    pub timestamp: NaiveDateTime,
    pub stream: &'a str,
    pub message: &'a str,
}

impl fmt::Display for LogEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} - {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.stream,
            self.message
        )
    }
}

/// Entry point for writing to named log streams
pub struct LoggingEngine {
    layout: Arc<LogLayout>,
    ledger: Arc<FileRetentionLedger>,
    registry: StreamRegistry,
}

impl LoggingEngine {
    /// Build an engine, creating the log directory if needed
    pub fn new(config: EngineConfig) -> LogResult<Self> {
        if config.max_streams == 0 {
            return Err(LogError::invalid_config("max_streams must be at least 1"));
        }

        std::fs::create_dir_all(&config.log_directory).map_err(|e| {
            LogError::invalid_config(format!(
                "cannot create log directory {}: {}",
                config.log_directory.display(),
                e
            ))
        })?;

        let ledger = FileRetentionLedger::open(&config.log_directory, config.retention)
            .map_err(|e| {
                LogError::invalid_config(format!(
                    "cannot read log directory {}: {}",
                    config.log_directory.display(),
                    e
                ))
            })?;
        let ledger = Arc::new(ledger);

        let layout = Arc::new(LogLayout::new(
            config.log_directory,
            config.hostname,
            config.policy,
        ));
        let registry =
            StreamRegistry::new(config.max_streams, Arc::clone(&layout), Arc::clone(&ledger));

        tracing::info!(
            directory = %ledger.directory().display(),
            hostname = %layout.hostname(),
            bucket_minutes = layout.policy().bucket_minutes(),
            max_streams = registry.max_streams(),
            existing_files = ledger.file_count(),
            max_files = ?ledger.policy().map(|p| p.max_files()),
            files_to_evict = ?ledger.policy().map(|p| p.files_to_evict()),
            "Logging engine ready"
        );

        Ok(Self {
            layout,
            ledger,
            registry,
        })
    }

    /// Build an engine from the service configuration
    pub fn from_config(config: &Config) -> LogResult<Self> {
        Self::new(config.engine_config()?)
    }

    /// Append `message` to `stream` using the local wall clock
    pub fn write(&self, stream: &str, message: &str) -> LogResult<usize> {
        self.write_at(stream, message, Local::now().naive_local())
    }

    /// Append `message` to `stream` as of `now`
    ///
    /// `now` picks the bucket and is also the timestamp written in the entry.
    pub fn write_at(&self, stream: &str, message: &str, now: NaiveDateTime) -> LogResult<usize> {
        validate_stream_name(stream)?;
        if stream.len() > self.layout.max_stream_name_len() {
            return Err(LogError::InvalidStreamName(stream.to_string()));
        }
        let file = self.registry.find_or_create(stream)?;
        let entry = LogEntry {
            timestamp: now,
            stream,
            message,
        }
        .to_string();
        file.append(&entry, &now)
    }

    /// Number of distinct streams seen so far
    pub fn stream_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of files the retention ledger is accounting for
    pub fn file_count(&self) -> usize {
        self.ledger.file_count()
    }

    /// File a stream writes to during the bucket `tag`
    pub fn path_for(&self, stream: &str, tag: &BucketTag) -> PathBuf {
        self.layout.path_for(stream, tag)
    }

    /// Bucket an instant falls in under this engine's policy
    pub fn bucket_of(&self, now: &NaiveDateTime) -> BucketTag {
        self.layout.policy().bucket_of(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn engine(
        dir: &Path,
        max_streams: usize,
        retention: Option<RetentionPolicy>,
    ) -> LoggingEngine {
        LoggingEngine::new(EngineConfig {
            log_directory: dir.to_path_buf(),
            hostname: "testhost".to_string(),
            max_streams,
            policy: TimeBucketPolicy::new(15).unwrap(),
            retention,
        })
        .unwrap()
    }

    #[test]
    fn test_entry_format() {
        let entry = LogEntry {
            timestamp: at(9, 5, 3),
            stream: "api",
            message: "hello",
        };
        assert_eq!(entry.to_string(), "2024-02-29 09:05:03 - api: hello\n");
    }

    #[test]
    fn test_quarter_hour_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path(), 4, None);

        engine.write_at("a", "hello", at(10, 7, 0)).unwrap();
        engine.write_at("a", "hello", at(10, 12, 0)).unwrap();

        let first = engine.path_for("a", &engine.bucket_of(&at(10, 7, 0)));
        assert!(first.to_string_lossy().ends_with("a.testhost.log.2024-02-29-10-00"));
        let before = fs::read_to_string(&first).unwrap();

        engine.write_at("a", "hello", at(10, 16, 0)).unwrap();
        let second = engine.path_for("a", &engine.bucket_of(&at(10, 16, 0)));
        assert_eq!(engine.bucket_of(&at(10, 16, 0)).to_string(), "202402291015");

        assert_eq!(
            before,
            "2024-02-29 10:07:00 - a: hello\n2024-02-29 10:12:00 - a: hello\n"
        );
        assert_eq!(fs::read_to_string(&first).unwrap(), before);
        assert_eq!(
            fs::read_to_string(&second).unwrap(),
            "2024-02-29 10:16:00 - a: hello\n"
        );
        assert_eq!(engine.file_count(), 2);
    }

    #[test]
    fn test_registry_full_surfaces() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path(), 1, None);

        engine.write_at("a", "x", at(10, 0, 0)).unwrap();
        let err = engine.write_at("b", "x", at(10, 0, 0)).unwrap_err();
        assert!(err.is_capacity_error());
        assert!(engine.write_at("a", "y", at(10, 1, 0)).is_ok());
        assert_eq!(engine.stream_count(), 1);
    }

    #[test]
    fn test_invalid_name_does_not_register() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path(), 1, None);

        let err = engine.write_at("../escape", "x", at(10, 0, 0)).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(engine.stream_count(), 0);
        assert!(engine.write_at("ok", "x", at(10, 0, 0)).is_ok());
    }

    #[test]
    fn test_rotation_enforces_file_cap() {
        let temp_dir = TempDir::new().unwrap();
        let policy = RetentionPolicy::new(3, 2).unwrap();
        let engine = engine(temp_dir.path(), 4, Some(policy));

        engine.write_at("a", "1", at(8, 0, 0)).unwrap();
        engine.write_at("a", "2", at(8, 15, 0)).unwrap();
        engine.write_at("b", "3", at(8, 30, 0)).unwrap();
        assert_eq!(engine.file_count(), 3);

        engine.write_at("a", "4", at(8, 45, 0)).unwrap();
        assert_eq!(engine.file_count(), 2);

        let mut remaining: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec![
                "a.testhost.log.2024-02-29-08-45".to_string(),
                "b.testhost.log.2024-02-29-08-30".to_string(),
            ]
        );
    }

    #[test]
    fn test_name_too_long_for_file_name_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path(), 2, None);

        // 255 - ".testhost" - ".log." - "YYYY-MM-DD-HH-MM"
        let longest = "x".repeat(225);
        assert!(engine.write_at(&longest, "fits", at(10, 0, 0)).is_ok());

        for _ in 0..3 {
            let err = engine
                .write_at(&"y".repeat(240), "x", at(10, 0, 0))
                .unwrap_err();
            assert!(matches!(err, LogError::InvalidStreamName(_)));
        }
        assert_eq!(engine.stream_count(), 1);
        assert!(engine.write_at("ok", "x", at(10, 0, 0)).is_ok());
    }

    #[test]
    fn test_zero_streams_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = LoggingEngine::new(EngineConfig {
            log_directory: temp_dir.path().to_path_buf(),
            hostname: "h".to_string(),
            max_streams: 0,
            policy: TimeBucketPolicy::new(15).unwrap(),
            retention: None,
        });
        assert!(matches!(result, Err(LogError::InvalidConfig(_))));
    }
}
