//! HTTP front end
//!
//! Accepts log writes on `POST /log/:logname` and reports counters on
//! `GET /stats`. Every response body is JSON.

pub mod routes;

pub use routes::{router, start, ServerHandle};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::LoggingEngine;
use crate::stats::StatsCounter;

/// Body of `POST /log/:logname`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    /// Text to append to the stream
    #[serde(rename = "Message", alias = "message", default)]
    pub message: String,
}

/// Envelope returned by the log endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogResponse {
    /// "ok" or "error"
    pub result: String,

    /// Failure description, absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogResponse {
    pub fn ok() -> Self {
        Self {
            result: "ok".to_string(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: "error".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == "ok"
    }
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LoggingEngine>,
    pub stats: Arc<StatsCounter>,
}

impl AppState {
    pub fn new(engine: LoggingEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            stats: Arc::new(StatsCounter::new()),
        }
    }
}
