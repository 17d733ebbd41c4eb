//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    AuthFailed,

    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// Peer public key has the wrong length
    #[error("invalid peer public key length: expected {expected}, got {actual}")]
    InvalidPeerKey {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key exchange produced a degenerate shared secret (low-order peer key)
    #[error("weak peer public key rejected")]
    WeakPeerKey,

    /// Session key derivation failed
    #[error("session key derivation failed")]
    KeyDerivation,

    /// Operation requires a derived session key
    #[error("session key not derived")]
    NotDerived,
}
