//! Diagnostics logging for the server itself
//!
//! Distinct from the stream files written by the engine: this is where the
//! server reports startup, rotations, evictions and request failures.

mod file_writer;

pub use file_writer::{build_filter, init_logging, LoggingGuard, SharedFileWriterMaker};
