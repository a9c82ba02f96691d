//! Error types for the logging engine

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the logging engine
#[derive(Error, Debug)]
pub enum LogError {
    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No room for another distinct stream name
    #[error("Maximum log streams created ({max})")]
    RegistryFull { max: usize },

    /// Stream name cannot be used as a file name component
    #[error("Invalid log name: {0:?}")]
    InvalidStreamName(String),

    /// The file for a new bucket could not be created or opened
    #[error("Unable to open log file for {stream} (bucket {tag}): {source}")]
    OpenFailed {
        stream: String,
        tag: String,
        #[source]
        source: io::Error,
    },

    /// Fewer bytes reached the file than the entry holds
    #[error("Unable to write full data to {stream}: wrote {written} of {expected} bytes")]
    ShortWrite {
        stream: String,
        written: usize,
        expected: usize,
    },

    /// The write call itself failed
    #[error("Unable to write to {stream}: {source}")]
    WriteFailed {
        stream: String,
        #[source]
        source: io::Error,
    },

    /// An old file picked for eviction could not be deleted
    #[error("Unable to evict {path:?}: {source}")]
    EvictionFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for engine operations
pub type LogResult<T> = std::result::Result<T, LogError>;

impl LogError {
    /// Create a new invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the caller did something wrong, as opposed to the server or disk
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidStreamName(_))
    }

    /// Whether the error comes from exhausted stream capacity
    pub fn is_capacity_error(&self) -> bool {
        matches!(self, Self::RegistryFull { .. })
    }
}
