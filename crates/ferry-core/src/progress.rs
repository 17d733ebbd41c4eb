//! Engine-to-UI progress seam.
//!
//! The engines narrate a session through this trait; rendering (bars,
//! speed smoothing, prompts) lives with the CLI. All methods default to
//! no-ops so tests and embedders can ignore what they do not need.

/// Observer for session progress events.
pub trait ProgressSink: Send {
    /// Sender is listening; `connection_string` is what the human on the
    /// other end needs to type.
    fn session_ready(&mut self, connection_string: &str) {
        let _ = connection_string;
    }

    /// Manifest agreed; totals cover every entry including ones later
    /// skipped as already complete.
    fn batch_started(&mut self, total_files: u64, total_bytes: u64) {
        let _ = (total_files, total_bytes);
    }

    /// A file began streaming.
    fn file_started(&mut self, path: &str, size: u64) {
        let _ = (path, size);
    }

    /// Bytes moved (or were verified as already present).
    fn bytes_transferred(&mut self, n: u64) {
        let _ = n;
    }

    /// A file finished and was placed at its final path.
    fn file_finished(&mut self, path: &str) {
        let _ = path;
    }

    /// A selective retry round was scheduled for these paths.
    fn retry_scheduled(&mut self, paths: &[String]) {
        let _ = paths;
    }
}

/// Sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}
