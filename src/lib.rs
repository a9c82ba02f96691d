//! Lumberjack - network logging service
//!
//! Clients post messages to named streams; each stream is written to a file
//! per time bucket, and the total number of files is capped by evicting the
//! oldest ones.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod server;
pub mod stats;

pub use engine::LoggingEngine;
pub use error::{LogError, LogResult};
