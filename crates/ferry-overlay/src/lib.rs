//! # Ferry Overlay
//!
//! Adapter for the trusted overlay network (Tailscale-shaped CLI).
//!
//! The overlay provides connectivity and peer identity; ferry treats it
//! as an opaque external collaborator reached through its CLI:
//!
//! - `tailscale ip -4` yields the local overlay IPv4 address
//! - `tailscale status --json` yields the authenticated peer listing
//!
//! Both invocations run with a fixed argument list (no shell) under a
//! hard 5 second timeout. Every failure mode - binary missing, timeout,
//! non-zero exit, malformed output - degrades to "not available" /
//! "unknown peer"; nothing in this crate panics or propagates an error
//! to callers.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod status;

pub use status::parse_status;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::RwLock;

/// Overlay CLI binary, resolved through `PATH`.
const OVERLAY_CMD: &str = "tailscale";

/// Hard wall-clock timeout for overlay CLI invocations.
const CLI_TIMEOUT: Duration = Duration::from_secs(5);

/// Peer cache time-to-live. Older caches are rebuilt wholesale.
const CACHE_TTL: Duration = Duration::from_secs(30);

/// Hostname reported for peers the overlay does not vouch for.
pub const UNKNOWN_PEER: &str = "unknown_peer";

/// Internal overlay invocation errors. These never escape the public
/// API; they exist so failures can be logged with their cause.
#[derive(Debug, Error)]
enum OverlayError {
    /// Spawning or reading the subprocess failed
    #[error("overlay CLI failed to run: {0}")]
    Spawn(#[from] std::io::Error),

    /// The subprocess exceeded the wall-clock timeout
    #[error("overlay CLI timed out")]
    Timeout,

    /// The subprocess exited non-zero
    #[error("overlay CLI exited with {0}")]
    NonZeroExit(std::process::ExitStatus),

    /// Output was not in the expected shape
    #[error("overlay CLI output malformed: {0}")]
    Malformed(String),
}

/// Run the overlay CLI with a fixed argument list and return stdout.
async fn run_overlay(args: &[&str]) -> Result<String, OverlayError> {
    let child = Command::new(OVERLAY_CMD)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(CLI_TIMEOUT, child)
        .await
        .map_err(|_| OverlayError::Timeout)??;

    if !output.status.success() {
        return Err(OverlayError::NonZeroExit(output.status));
    }

    String::from_utf8(output.stdout)
        .map_err(|_| OverlayError::Malformed("stdout not UTF-8".into()))
}

/// Parse a single IPv4 address out of CLI output.
///
/// The output must contain exactly one non-empty line and that line must
/// be an IPv4 address.
fn parse_single_ipv4(output: &str) -> Option<Ipv4Addr> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next()?;
    if lines.next().is_some() {
        return None;
    }
    first.parse().ok()
}

/// Discover the local overlay IPv4 address.
///
/// Returns `None` when the overlay CLI is missing, times out, exits
/// non-zero, or prints anything other than a single IPv4 address.
pub async fn local_endpoint() -> Option<Ipv4Addr> {
    match run_overlay(&["ip", "-4"]).await {
        Ok(out) => {
            let addr = parse_single_ipv4(&out);
            if addr.is_none() {
                tracing::debug!("overlay ip output malformed: {:?}", out.trim());
            }
            addr
        }
        Err(e) => {
            tracing::debug!("overlay ip unavailable: {e}");
            None
        }
    }
}

/// Snapshot of the overlay's authenticated peers.
struct PeerCache {
    peers: HashMap<Ipv4Addr, String>,
    refreshed_at: Instant,
}

/// Process-wide directory of authenticated overlay peers.
///
/// The whole mapping is rebuilt when older than [`CACHE_TTL`]; refresh is
/// build-then-swap behind the lock, so concurrent callers observe either
/// the previous mapping or the fully rebuilt one, never a partial state.
pub struct PeerDirectory {
    cache: RwLock<Option<PeerCache>>,
}

impl Default for PeerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerDirectory {
    /// Create an empty directory. The first verification triggers a refresh.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(None),
        }
    }

    /// Create a directory pre-seeded with a peer mapping (test support).
    #[must_use]
    pub fn with_peers(peers: HashMap<Ipv4Addr, String>) -> Self {
        Self {
            cache: RwLock::new(Some(PeerCache {
                peers,
                refreshed_at: Instant::now(),
            })),
        }
    }

    /// Verify that `ip` is an authenticated overlay peer.
    ///
    /// Returns `(true, hostname)` iff the address appears in a fresh or
    /// still-valid peer mapping. Any subprocess or parse failure during
    /// refresh yields `(false, "unknown_peer")`.
    pub async fn verify_peer(&self, ip: Ipv4Addr) -> (bool, String) {
        {
            let guard = self.cache.read().await;
            if let Some(cache) = guard.as_ref() {
                if cache.refreshed_at.elapsed() < CACHE_TTL {
                    return Self::lookup(&cache.peers, ip);
                }
            }
        }

        let peers = match self.refresh().await {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!("overlay peer refresh failed: {e}");
                return (false, UNKNOWN_PEER.to_string());
            }
        };

        let result = Self::lookup(&peers, ip);
        let mut guard = self.cache.write().await;
        *guard = Some(PeerCache {
            peers,
            refreshed_at: Instant::now(),
        });
        result
    }

    /// Rebuild the peer mapping from `tailscale status --json`.
    async fn refresh(&self) -> Result<HashMap<Ipv4Addr, String>, OverlayError> {
        let out = run_overlay(&["status", "--json"]).await?;
        parse_status(&out).map_err(|e| OverlayError::Malformed(e.to_string()))
    }

    fn lookup(peers: &HashMap<Ipv4Addr, String>, ip: Ipv4Addr) -> (bool, String) {
        match peers.get(&ip) {
            Some(host) => (true, host.clone()),
            None => (false, UNKNOWN_PEER.to_string()),
        }
    }
}
