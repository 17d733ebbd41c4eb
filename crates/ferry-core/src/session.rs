//! Session establishment: connection strings, timeouts, key exchange.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ferry_crypto::{SessionCrypto, PUBLIC_KEY_SIZE};

use crate::error::TransferError;

/// Fixed transfer port. The sender binds and listens; the receiver
/// connects. Tests override this through the engine configs.
pub const TRANSFER_PORT: u16 = 15820;

/// Sender waits this long for the one inbound connection.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Receiver connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Receiver waits this long for the manifest frame.
pub const MANIFEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Idle timeout between data frames.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-iteration timeout in the retry loop, both directions.
pub const RETRY_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum receiver-requested retry iterations per session.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Parsed `ip:word-word` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Sender's overlay IPv4 address
    pub ip: Ipv4Addr,
    /// Two-word transfer token
    pub token: String,
}

impl ConnectionString {
    /// Assemble a connection string for display.
    #[must_use]
    pub fn new(ip: Ipv4Addr, token: String) -> Self {
        Self { ip, token }
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.token)
    }
}

impl FromStr for ConnectionString {
    type Err = TransferError;

    /// Parse and shape-check `<IPv4>:<word>-<word>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TransferError::Protocol(format!("invalid connection string: {s}"));

        let (ip_part, token) = s.split_once(':').ok_or_else(bad)?;
        let ip: Ipv4Addr = ip_part.parse().map_err(|_| bad())?;

        let (first, second) = token.split_once('-').ok_or_else(bad)?;
        let word_ok = |w: &str| !w.is_empty() && w.bytes().all(|b| b.is_ascii_lowercase());
        if !word_ok(first) || !word_ok(second) {
            return Err(bad());
        }

        Ok(Self {
            ip,
            token: token.to_string(),
        })
    }
}

/// Sender half of the public-key exchange: write ours first, read the
/// peer's, derive the session key.
///
/// # Errors
///
/// Returns [`TransferError::Network`] on socket failure and
/// [`TransferError::Crypto`] if derivation fails.
pub async fn handshake_as_sender<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    crypto: &mut SessionCrypto,
    token: &str,
) -> Result<(), TransferError> {
    stream.write_all(&crypto.public_bytes()).await?;
    stream.flush().await?;

    let mut peer_pk = [0u8; PUBLIC_KEY_SIZE];
    stream.read_exact(&mut peer_pk).await?;

    crypto.derive(&peer_pk, token)?;
    Ok(())
}

/// Receiver half: read the sender's key first, then write ours.
///
/// # Errors
///
/// Returns [`TransferError::Network`] on socket failure and
/// [`TransferError::Crypto`] if derivation fails.
pub async fn handshake_as_receiver<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    crypto: &mut SessionCrypto,
    token: &str,
) -> Result<(), TransferError> {
    let mut peer_pk = [0u8; PUBLIC_KEY_SIZE];
    stream.read_exact(&mut peer_pk).await?;

    stream.write_all(&crypto.public_bytes()).await?;
    stream.flush().await?;

    crypto.derive(&peer_pk, token)?;
    Ok(())
}
