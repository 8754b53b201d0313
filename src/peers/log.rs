use chrono::{DateTime, Local};
use std::path::PathBuf;
use tracing::warn;

use crate::utils::append_line;

/// Timestamp format of every peer-refresh log line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only operator log at `<node-home>/logs/peer-refresh.log`.
#[derive(Debug, Clone)]
pub struct RefreshLog {
    path: PathBuf,
}

impl RefreshLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Append `message` stamped with the local time. Write failures are only traced.
    pub fn record(&self, message: &str) {
        let line = format_line(Local::now(), message);
        if let Err(e) = append_line(&self.path, &line) {
            warn!("Could not write peer refresh log {}: {e:#}", self.path.display());
        }
    }
}

#[must_use]
pub fn format_line(at: DateTime<Local>, message: &str) -> String {
    format!("{} {message}", at.format(TIMESTAMP_FORMAT))
}
