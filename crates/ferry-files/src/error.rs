//! File engine error types.

use std::path::PathBuf;
use thiserror::Error;

/// File engine errors
#[derive(Debug, Error)]
pub enum FileError {
    /// Non-recoverable I/O error with the path it occurred on
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path the operation touched
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Manifest path escapes the destination root or is otherwise disallowed
    #[error("unsafe path: {0}")]
    UnsafePath(String),

    /// A chunk would extend a writer past its declared size. This is an
    /// internal accounting violation, never a wire or path condition.
    #[error("chunk overruns declared size for {0}")]
    Overrun(String),

    /// An exclusion pattern failed to compile
    #[error("invalid exclusion pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// Input path does not exist or is not a file or directory
    #[error("input not found: {0}")]
    InputNotFound(PathBuf),
}

impl FileError {
    /// Attach a path to a bare I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
