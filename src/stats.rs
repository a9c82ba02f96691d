//! Request and write counters exposed on `/stats`

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    #[serde(serialize_with = "serialize_rfc1123")]
    pub startup_time: DateTime<Utc>,
    pub requests: u64,
    #[serde(rename = "logsWritten")]
    pub logs_written: u64,
    pub errors: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Startup Time: {:>12}\nRequests: {:>12}\nLogs Written: {:>12}\nErrors: {:>12}",
            self.startup_time.timestamp(),
            self.requests,
            self.logs_written,
            self.errors
        )
    }
}

fn format_rfc1123(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// RFC 1123 date, e.g. `Mon, 02 Jan 2006 15:04:05 GMT`
fn serialize_rfc1123<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_rfc1123(time))
}

/// Lock-protected service counters
#[derive(Debug)]
pub struct StatsCounter {
    inner: Mutex<StatsSnapshot>,
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCounter {
    /// Start counting from zero, stamping the current time as startup
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(startup_time: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(StatsSnapshot {
                startup_time,
                requests: 0,
                logs_written: 0,
                errors: 0,
            }),
        }
    }

    pub fn inc_requests(&self) {
        self.update(|s| s.requests += 1);
    }

    pub fn inc_logs_written(&self) {
        self.update(|s| s.logs_written += 1);
    }

    pub fn inc_errors(&self) {
        self.update(|s| s.errors += 1);
    }

    /// Consistent copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut StatsSnapshot)) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }
}
