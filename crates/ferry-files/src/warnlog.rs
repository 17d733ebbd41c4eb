//! Append-only local warning log.
//!
//! Non-fatal events land in `transfer_warnings.log` next to where the
//! transfer runs, one `[timestamp] message` line per event, so a user
//! can reconstruct what was skipped or retried after the progress bars
//! are gone. The sink never raises: if the log itself cannot be written
//! the event still reaches `tracing` and is otherwise dropped.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

/// Warning log file name.
pub const WARNING_LOG: &str = "transfer_warnings.log";

/// Append-only sink for non-fatal events.
#[derive(Debug, Clone)]
pub struct WarningSink {
    path: PathBuf,
}

impl WarningSink {
    /// Create a sink writing to `dir/transfer_warnings.log`.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(WARNING_LOG),
        }
    }

    /// Record a warning. I/O failures are swallowed.
    pub fn warn(&self, message: &str) {
        tracing::warn!("{message}");

        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = format!("[{stamp}] {message}\n");
        let _ = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
    }

    /// Path of the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
