//! Per-stream file handle and rotation
//!
//! Each stream owns at most one open file. A write whose bucket differs from
//! the open file's bucket first opens the next file, registers it with the
//! retention ledger and only then swaps the handle.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::bucket::{BucketTag, TimeBucketPolicy, FILE_SUFFIX_LEN};
use super::retention::{FileRetentionLedger, LOG_MARKER};
use crate::error::{LogError, LogResult};

/// Longest file name most filesystems accept, in bytes
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Where stream files live and how they are named
#[derive(Debug, Clone)]
pub struct LogLayout {
    directory: PathBuf,
    hostname: String,
    policy: TimeBucketPolicy,
}

impl LogLayout {
    pub fn new(
        directory: impl Into<PathBuf>,
        hostname: impl Into<String>,
        policy: TimeBucketPolicy,
    ) -> Self {
        Self {
            directory: directory.into(),
            hostname: hostname.into(),
            policy,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Longest stream name whose file name still fits in `MAX_FILE_NAME_LEN`
    pub fn max_stream_name_len(&self) -> usize {
        let fixed = 1 + self.hostname.len() + LOG_MARKER.len() + FILE_SUFFIX_LEN;
        MAX_FILE_NAME_LEN.saturating_sub(fixed)
    }

    pub fn policy(&self) -> TimeBucketPolicy {
        self.policy
    }

    /// `<dir>/<stream>.<hostname>.log.<YYYY-MM-DD-HH-MM>`
    pub fn path_for(&self, stream: &str, tag: &BucketTag) -> PathBuf {
        self.directory.join(format!(
            "{}.{}{}{}",
            stream,
            self.hostname,
            LOG_MARKER,
            tag.file_suffix()
        ))
    }
}

struct OpenFile {
    tag: BucketTag,
    path: PathBuf,
    file: File,
}

impl OpenFile {
    fn write_entry(&mut self, stream: &str, entry: &str) -> LogResult<usize> {
        let bytes = entry.as_bytes();
        let written = self
            .file
            .write(bytes)
            .map_err(|source| LogError::WriteFailed {
                stream: stream.to_string(),
                source,
            })?;
        ensure_complete(stream, written, bytes.len())?;
        Ok(written)
    }
}

/// Partial writes are failures, even when the write call reported success
fn ensure_complete(stream: &str, written: usize, expected: usize) -> LogResult<()> {
    if written < expected {
        return Err(LogError::ShortWrite {
            stream: stream.to_string(),
            written,
            expected,
        });
    }
    Ok(())
}

/// One logical stream and its current backing file
pub struct StreamFile {
    name: String,
    layout: Arc<LogLayout>,
    ledger: Arc<FileRetentionLedger>,
    current: Mutex<Option<OpenFile>>,
}

impl StreamFile {
    /// Create an unopened stream; no file is touched until the first append
    pub fn new(
        name: impl Into<String>,
        layout: Arc<LogLayout>,
        ledger: Arc<FileRetentionLedger>,
    ) -> Self {
        Self {
            name: name.into(),
            layout,
            ledger,
            current: Mutex::new(None),
        }
    }

    /// Bucket of the open file, `None` before the first write
    pub fn current_tag(&self) -> Option<BucketTag> {
        self.lock().as_ref().map(|open| open.tag)
    }

    /// Path of the open file, `None` before the first write
    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|open| open.path.clone())
    }

    /// Append a formatted entry, rolling to a new file if `now` is in a new bucket
    ///
    /// Returns the number of bytes written. On an open failure the previous
    /// file stays in place and keeps receiving writes for its bucket.
    pub fn append(&self, entry: &str, now: &NaiveDateTime) -> LogResult<usize> {
        let tag = self.layout.policy().bucket_of(now);
        let mut current = self.lock();

        let open = match current.take() {
            Some(open) if open.tag == tag => open,
            previous => match self.open_bucket(tag) {
                Ok(opened) => {
                    if let Some(previous) = previous {
                        debug!(
                            stream = %self.name,
                            path = %previous.path.display(),
                            "Closing rotated log file"
                        );
                    }
                    opened
                }
                Err(e) => {
                    *current = previous;
                    return Err(e);
                }
            },
        };

        current.insert(open).write_entry(&self.name, entry)
    }

    /// Open the file for `tag` while holding the ledger lock
    fn open_bucket(&self, tag: BucketTag) -> LogResult<OpenFile> {
        let path = self.layout.path_for(&self.name, &tag);

        let mut ledger = self.ledger.lock();
        let existed = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| {
                warn!("Error opening log file: {} - {}", path.display(), source);
                LogError::OpenFailed {
                    stream: self.name.clone(),
                    tag: tag.to_string(),
                    source,
                }
            })?;

        if !existed {
            let report = ledger.record_new_file(&path);
            if !report.deleted.is_empty() {
                debug!(
                    deleted = report.deleted.len(),
                    failed = report.failed.len(),
                    "Retention cap reached"
                );
            }
        }
        drop(ledger);

        info!(stream = %self.name, path = %path.display(), "Opened log file");

        Ok(OpenFile { tag, path, file })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<OpenFile>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
