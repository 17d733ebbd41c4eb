//! Overlay status document parsing.
//!
//! `tailscale status --json` emits one large document; ferry only needs
//! the `Peer` object, which maps a stable peer key to per-peer details
//! including overlay addresses and hostname. Unknown fields are ignored
//! so newer overlay CLI versions keep parsing.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StatusDoc {
    #[serde(rename = "Peer", default)]
    peer: HashMap<String, PeerEntry>,
}

#[derive(Debug, Deserialize)]
struct PeerEntry {
    #[serde(rename = "TailscaleIPs", default)]
    ips: Vec<String>,
    #[serde(rename = "HostName", default)]
    host_name: String,
}

/// Parse the overlay status JSON into an `ip -> hostname` mapping.
///
/// Only IPv4 addresses are kept; a peer advertising several addresses
/// appears once per IPv4 address.
///
/// # Errors
///
/// Returns the underlying `serde_json` error if the document is not
/// valid JSON or the `Peer` object has the wrong shape.
pub fn parse_status(json: &str) -> Result<HashMap<Ipv4Addr, String>, serde_json::Error> {
    let doc: StatusDoc = serde_json::from_str(json)?;

    let mut peers = HashMap::new();
    for entry in doc.peer.into_values() {
        for ip in &entry.ips {
            if let Ok(v4) = ip.parse::<Ipv4Addr>() {
                peers.insert(v4, entry.host_name.clone());
            }
        }
    }
    Ok(peers)
}
