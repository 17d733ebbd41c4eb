//! # Ferry Crypto
//!
//! Cryptographic primitives for ferry.
//!
//! This crate provides:
//! - Ephemeral X25519 key agreement bound to a human-communicable token
//! - HKDF-SHA256 session key derivation
//! - `ChaCha20-Poly1305` AEAD encryption for wire frames
//! - Two-word transfer token generation from the OS CSPRNG
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Key Exchange | X25519 (ephemeral) |
//! | KDF | HKDF-SHA256, salted with the transfer token |
//! | AEAD | ChaCha20-Poly1305 |
//! | Content Hash | SHA-256 |
//!
//! No long-term key material exists: both sides generate a fresh key pair
//! per session and the derived key dies with the connection.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod token;

pub use context::SessionCrypto;
pub use error::CryptoError;
pub use token::generate_token;

/// X25519 public key size in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 session key size in bytes
pub const SESSION_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;
