//! Stream registry
//!
//! Maps stream names to their [`StreamFile`]. Entries are created on first use
//! and live as long as the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::retention::FileRetentionLedger;
use super::stream::{LogLayout, StreamFile};
use crate::error::{LogError, LogResult};

/// Longest accepted stream name, in bytes
pub const MAX_STREAM_NAME_LEN: usize = 255;

/// Bounded set of named streams
pub struct StreamRegistry {
    streams: Mutex<HashMap<String, Arc<StreamFile>>>,
    max_streams: usize,
    layout: Arc<LogLayout>,
    ledger: Arc<FileRetentionLedger>,
}

impl StreamRegistry {
    pub fn new(
        max_streams: usize,
        layout: Arc<LogLayout>,
        ledger: Arc<FileRetentionLedger>,
    ) -> Self {
        Self {
            streams: Mutex::new(HashMap::with_capacity(max_streams.min(1024))),
            max_streams,
            layout,
            ledger,
        }
    }

    /// Return the stream for `name`, creating it if there is room
    ///
    /// The map lock is held only for the lookup and insert.
    pub fn find_or_create(&self, name: &str) -> LogResult<Arc<StreamFile>> {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(stream) = streams.get(name) {
            return Ok(Arc::clone(stream));
        }

        if streams.len() >= self.max_streams {
            return Err(LogError::RegistryFull {
                max: self.max_streams,
            });
        }

        validate_stream_name(name)?;

        let stream = Arc::new(StreamFile::new(
            name,
            Arc::clone(&self.layout),
            Arc::clone(&self.ledger),
        ));
        streams.insert(name.to_string(), Arc::clone(&stream));
        tracing::debug!(stream = %name, total = streams.len(), "Registered log stream");
        Ok(stream)
    }

    /// Look up an existing stream without creating it
    pub fn get(&self, name: &str) -> Option<Arc<StreamFile>> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Number of distinct streams
    pub fn len(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_streams(&self) -> usize {
        self.max_streams
    }

    /// Registered stream names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Reject names that would escape the log directory or produce odd file names
pub fn validate_stream_name(name: &str) -> LogResult<()> {
    let invalid = name.is_empty()
        || name.len() > MAX_STREAM_NAME_LEN
        || name.starts_with('.')
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if invalid {
        return Err(LogError::InvalidStreamName(name.to_string()));
    }
    Ok(())
}
