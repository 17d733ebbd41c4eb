//! Per-session encryption context.
//!
//! Each side of a transfer generates a fresh X25519 key pair, exchanges
//! raw public keys over the freshly accepted connection, and derives a
//! shared ChaCha20-Poly1305 key via HKDF-SHA256 salted with the two-word
//! transfer token. Binding the token into the KDF means a peer that can
//! reach the listener but does not know the token derives a different key
//! and fails authentication on the first frame.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::{NONCE_SIZE, PUBLIC_KEY_SIZE, SESSION_KEY_SIZE};

/// HKDF info label for session key expansion.
const SESSION_INFO: &[u8] = b"session";

/// Session encryption context.
///
/// Holds the ephemeral key pair and, once [`derive`](Self::derive) has
/// run, the AEAD cipher for the session. The secret key is zeroized on
/// drop by `x25519-dalek`.
pub struct SessionCrypto {
    secret: StaticSecret,
    public: PublicKey,
    cipher: Option<ChaCha20Poly1305>,
}

impl SessionCrypto {
    /// Generate a fresh ephemeral key pair from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            cipher: None,
        }
    }

    /// Raw 32-byte X25519 public key for the wire exchange.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Whether a session key has been derived.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cipher.is_some()
    }

    /// Derive the session key from the peer's public key and the token.
    ///
    /// Computes the X25519 shared secret, then expands a 32-byte key via
    /// HKDF-SHA256 with `salt = utf8(token)` and `info = "session"`, and
    /// initializes the AEAD cipher. On any failure the context is left
    /// without a cipher.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPeerKey`] if `peer_public` is not
    /// exactly 32 bytes, [`CryptoError::WeakPeerKey`] if the exchange
    /// yields an all-zero shared secret (low-order point), and
    /// [`CryptoError::KeyDerivation`] if HKDF expansion fails.
    pub fn derive(&mut self, peer_public: &[u8], token: &str) -> Result<(), CryptoError> {
        self.cipher = None;

        let peer_bytes: [u8; PUBLIC_KEY_SIZE] =
            peer_public
                .try_into()
                .map_err(|_| CryptoError::InvalidPeerKey {
                    expected: PUBLIC_KEY_SIZE,
                    actual: peer_public.len(),
                })?;
        let peer_key = PublicKey::from(peer_bytes);

        let shared = self.secret.diffie_hellman(&peer_key);
        if shared.as_bytes() == &[0u8; 32] {
            return Err(CryptoError::WeakPeerKey);
        }

        let hk = Hkdf::<Sha256>::new(Some(token.as_bytes()), shared.as_bytes());
        let mut session_key = [0u8; SESSION_KEY_SIZE];
        hk.expand(SESSION_INFO, &mut session_key)
            .map_err(|_| CryptoError::KeyDerivation)?;

        self.cipher = Some(ChaCha20Poly1305::new(Key::from_slice(&session_key)));
        session_key.zeroize();

        Ok(())
    }

    /// Encrypt a plaintext under the session key.
    ///
    /// The ciphertext is `plaintext.len() + 16` bytes (Poly1305 tag
    /// appended). Nonces are supplied by the frame codec, which guarantees
    /// per-key uniqueness; this context never retains them.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::NotDerived`] before key derivation and
    /// [`CryptoError::EncryptionFailed`] on cipher failure.
    pub fn encrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher.as_ref().ok_or(CryptoError::NotDerived)?;
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt and authenticate a ciphertext under the session key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::NotDerived`] before key derivation and
    /// [`CryptoError::AuthFailed`] if the tag does not verify. No
    /// plaintext is ever returned from a failed decryption.
    pub fn decrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher.as_ref().ok_or(CryptoError::NotDerived)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TAG_SIZE;

    fn derived_pair(token: &str) -> (SessionCrypto, SessionCrypto) {
        let mut alice = SessionCrypto::generate();
        let mut bob = SessionCrypto::generate();
        let alice_pk = alice.public_bytes();
        let bob_pk = bob.public_bytes();
        alice.derive(&bob_pk, token).unwrap();
        bob.derive(&alice_pk, token).unwrap();
        (alice, bob)
    }

    #[test]
    fn test_fresh_context_has_no_cipher() {
        let ctx = SessionCrypto::generate();
        assert!(!ctx.is_ready());
        assert!(matches!(
            ctx.encrypt(&[0u8; NONCE_SIZE], b"data"),
            Err(CryptoError::NotDerived)
        ));
    }

    #[test]
    fn test_roundtrip_with_shared_token() {
        let (alice, bob) = derived_pair("ocean-tiger");
        let nonce = [7u8; NONCE_SIZE];

        let ct = alice.encrypt(&nonce, b"hello ferry").unwrap();
        assert_eq!(ct.len(), b"hello ferry".len() + TAG_SIZE);

        let pt = bob.decrypt(&nonce, &ct).unwrap();
        assert_eq!(pt, b"hello ferry");
    }

    #[test]
    fn test_token_mismatch_fails_authentication() {
        let mut alice = SessionCrypto::generate();
        let mut bob = SessionCrypto::generate();
        let alice_pk = alice.public_bytes();
        let bob_pk = bob.public_bytes();
        alice.derive(&bob_pk, "ocean-tiger").unwrap();
        bob.derive(&alice_pk, "ocean-tigre").unwrap();

        let ct = alice.encrypt(&[0u8; NONCE_SIZE], b"secret").unwrap();
        assert!(matches!(
            bob.decrypt(&[0u8; NONCE_SIZE], &ct),
            Err(CryptoError::AuthFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (alice, bob) = derived_pair("maple-heron");
        let nonce = [1u8; NONCE_SIZE];
        let ct = alice.encrypt(&nonce, b"payload bytes").unwrap();

        for i in 0..ct.len() {
            let mut tampered = ct.clone();
            tampered[i] ^= 0x01;
            assert!(matches!(
                bob.decrypt(&nonce, &tampered),
                Err(CryptoError::AuthFailed)
            ));
        }

        // Untouched ciphertext still decrypts
        let pt = bob.decrypt(&nonce, &ct).unwrap();
        assert_eq!(pt, b"payload bytes");
    }

    #[test]
    fn test_bad_peer_key_length() {
        let mut ctx = SessionCrypto::generate();
        let err = ctx.derive(&[0u8; 31], "a-b").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidPeerKey {
                expected: 32,
                actual: 31
            }
        ));
        assert!(!ctx.is_ready());
    }

    #[test]
    fn test_low_order_peer_key_rejected() {
        let mut ctx = SessionCrypto::generate();
        assert!(matches!(
            ctx.derive(&[0u8; 32], "a-b"),
            Err(CryptoError::WeakPeerKey)
        ));
        assert!(!ctx.is_ready());
    }

    #[test]
    fn test_failed_derive_clears_previous_cipher() {
        let (mut alice, _bob) = derived_pair("cedar-wolf");
        assert!(alice.is_ready());
        let _ = alice.derive(&[0u8; 32], "cedar-wolf");
        assert!(!alice.is_ready());
    }
}
