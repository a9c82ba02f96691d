//! Log file retention management
//!
//! Keeps a running count of the files in the log directory and, once the
//! configured cap is exceeded, deletes the oldest ones. Age comes from the
//! timestamp embedded at the end of each file name, not from file metadata.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::bucket::FILE_SUFFIX_LEN;
use crate::error::{LogError, LogResult};

/// Upper bound accepted for `max_files`
pub const MAX_FILES_LIMIT: usize = 100_000;

/// Default cap on the number of files in the log directory
pub const DEFAULT_MAX_FILES: usize = 2000;

/// Default number of files deleted when the cap is exceeded
pub const DEFAULT_FILES_TO_EVICT: usize = 2;

/// Separator between host name and timestamp in stream file names
pub(crate) const LOG_MARKER: &str = ".log.";

/// Shortest name that carries an embedded timestamp
const MIN_KEYED_NAME_LEN: usize = LOG_MARKER.len() + FILE_SUFFIX_LEN;

/// Cap on total files and how many to drop when it is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_files: usize,
    files_to_evict: usize,
}

impl RetentionPolicy {
    pub fn new(max_files: usize, files_to_evict: usize) -> LogResult<Self> {
        if max_files == 0 || max_files > MAX_FILES_LIMIT {
            return Err(LogError::invalid_config(format!(
                "max_files must be greater than 0 and at most {}: {}",
                MAX_FILES_LIMIT, max_files
            )));
        }
        if files_to_evict == 0 || files_to_evict > max_files {
            return Err(LogError::invalid_config(format!(
                "files_to_evict must be greater than 0 and at most max_files: files_to_evict={} max_files={}",
                files_to_evict, max_files
            )));
        }
        Ok(Self {
            max_files,
            files_to_evict,
        })
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn files_to_evict(&self) -> usize {
        self.files_to_evict
    }
}

/// Outcome of one eviction pass
#[derive(Debug, Default)]
pub struct EvictionReport {
    /// Files removed from disk
    pub deleted: Vec<PathBuf>,
    /// Files that were selected but could not be removed
    pub failed: Vec<LogError>,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.failed.is_empty()
    }
}

struct LedgerState {
    current_files: usize,
}

/// Installation-wide file count shared by every stream
pub struct FileRetentionLedger {
    directory: PathBuf,
    policy: Option<RetentionPolicy>,
    state: Mutex<LedgerState>,
}

impl FileRetentionLedger {
    /// Create a ledger for `directory`, counting the files already present
    ///
    /// With no policy the ledger only counts; nothing is ever evicted.
    pub fn open(
        directory: impl Into<PathBuf>,
        policy: Option<RetentionPolicy>,
    ) -> io::Result<Self> {
        let directory = directory.into();
        let current_files = list_files(&directory)?.len();
        Ok(Self {
            directory,
            policy,
            state: Mutex::new(LedgerState { current_files }),
        })
    }

    /// Directory whose files are accounted for
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn policy(&self) -> Option<RetentionPolicy> {
        self.policy
    }

    /// Current file count
    pub fn file_count(&self) -> usize {
        self.lock().state.current_files
    }

    /// Take the ledger lock
    ///
    /// Streams hold this while opening a rotated file so that creation and
    /// accounting happen as one step.
    pub fn lock(&self) -> LedgerGuard<'_> {
        LedgerGuard {
            ledger: self,
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Count a freshly created file and evict if the cap is exceeded
    pub fn record_new_file(&self, created: &Path) -> EvictionReport {
        self.lock().record_new_file(created)
    }
}

/// Exclusive access to the ledger count
pub struct LedgerGuard<'a> {
    ledger: &'a FileRetentionLedger,
    state: MutexGuard<'a, LedgerState>,
}

impl LedgerGuard<'_> {
    /// Count a freshly created file and evict if the cap is exceeded
    ///
    /// `created` is never picked for eviction.
    pub fn record_new_file(&mut self, created: &Path) -> EvictionReport {
        self.record_new_file_with(created, |path| fs::remove_file(path))
    }

    fn record_new_file_with<F>(&mut self, created: &Path, remove: F) -> EvictionReport
    where
        F: Fn(&Path) -> io::Result<()>,
    {
        self.state.current_files += 1;

        let Some(policy) = self.ledger.policy else {
            return EvictionReport::default();
        };
        if self.state.current_files <= policy.max_files {
            return EvictionReport::default();
        }

        let report = self.evict_oldest(policy.files_to_evict, created, remove);
        self.state.current_files =
            self.state.current_files.saturating_sub(report.deleted.len());
        report
    }

    fn evict_oldest<F>(&self, count: usize, keep: &Path, remove: F) -> EvictionReport
    where
        F: Fn(&Path) -> io::Result<()>,
    {
        let mut report = EvictionReport::default();

        let mut candidates = match list_files(&self.ledger.directory) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    "Failed to list {} for eviction: {}",
                    self.ledger.directory.display(),
                    e
                );
                return report;
            }
        };
        candidates.retain(|path| path != keep);
        sort_oldest_first(&mut candidates);

        for path in candidates.into_iter().take(count) {
            match remove(&path) {
                Ok(()) => {
                    tracing::info!("Evicted old log file {}", path.display());
                    report.deleted.push(path);
                }
                Err(source) => {
                    let err = LogError::EvictionFailed { path, source };
                    tracing::warn!("{}", err);
                    report.failed.push(err);
                }
            }
        }

        report
    }
}

/// Sort key for eviction: the trailing timestamp, `None` for short or malformed names
pub fn eviction_key(file_name: &str) -> Option<&str> {
    if file_name.len() < MIN_KEYED_NAME_LEN {
        return None;
    }
    let split = file_name.len() - FILE_SUFFIX_LEN;
    let head = file_name.get(..split)?;
    if !head.ends_with(LOG_MARKER) {
        return None;
    }
    file_name.get(split..)
}

/// Oldest first; unkeyed names lead, ties fall back to the whole name
fn sort_oldest_first(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        let a = file_name_str(a);
        let b = file_name_str(b);
        eviction_key(&a)
            .cmp(&eviction_key(&b))
            .then_with(|| a.cmp(&b))
    });
}

fn file_name_str(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default()
}

/// Regular files directly inside `dir`
fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}
