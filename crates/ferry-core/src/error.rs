//! Transfer error taxonomy.
//!
//! A closed sum; every terminal session state maps to exactly one
//! variant. Lock-document corruption never appears here: it is logged
//! and treated as an absent lock by the lock manager.

use ferry_crypto::CryptoError;
use ferry_files::FileError;
use thiserror::Error;

/// Transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    /// Bind, connect, timeout, unexpected EOF, local endpoint unavailable
    #[error("network error: {0}")]
    Network(String),

    /// Overlay verification failed, or pod-mode peer was not loopback
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// AEAD tag failure or handshake failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Unknown tag, frame over cap, offset out of range, frame in the
    /// wrong state, nonce desynchronization
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Files still unverified after retry exhaustion
    #[error("integrity failure: {0} file(s) could not be verified")]
    Integrity(usize),

    /// Manifest contained a disallowed relative path
    #[error("unsafe path in manifest: {0}")]
    PathUnsafe(String),

    /// Non-recoverable disk I/O error
    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<FileError> for TransferError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::UnsafePath(path) => Self::PathUnsafe(path),
            other => Self::Filesystem(other.to_string()),
        }
    }
}
