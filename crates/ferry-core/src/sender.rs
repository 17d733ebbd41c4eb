//! Sender engine.
//!
//! State machine: bind and announce, accept exactly one verified peer,
//! key exchange, manifest, single-pass read-hash-frame-send over every
//! entry, then the retry loop until the receiver's ack. The sender keeps
//! no persisted state; the receiver drives all recovery through
//! `RetryRequest` frames.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use ferry_crypto::{generate_token, SessionCrypto};
use ferry_files::enumerate::{enumerate, total_size, FileEntry};
use ferry_files::WarningSink;
use ferry_overlay::PeerDirectory;

use crate::error::TransferError;
use crate::frame::{AckStatus, Frame, FrameCodec, DATA_CHUNK_SIZE};
use crate::manifest::Manifest;
use crate::progress::ProgressSink;
use crate::session::{
    handshake_as_sender, ConnectionString, ACCEPT_TIMEOUT, MAX_RETRY_ATTEMPTS, RETRY_TIMEOUT,
    TRANSFER_PORT,
};

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Files and directories to transfer
    pub inputs: Vec<PathBuf>,
    /// Exclusion globs matched against relative paths and components
    pub excludes: Vec<String>,
    /// Negotiate block compression for file data
    pub compress: bool,
    /// Pod mode: bind loopback, skip overlay verification
    pub pod_mode: bool,
    /// Listen port; the fixed transfer port unless overridden
    pub port: u16,
    /// Directory for the warning log
    pub working_dir: PathBuf,
}

impl SenderConfig {
    /// Config with defaults for everything but the inputs.
    #[must_use]
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            excludes: Vec::new(),
            compress: false,
            pod_mode: false,
            port: TRANSFER_PORT,
            working_dir: PathBuf::from("."),
        }
    }
}

/// A bound sender, ready to accept its one receiver.
///
/// Binding is split from running so the caller can surface the
/// connection string (and, in tests, the ephemeral port) before the
/// accept blocks.
pub struct Sender {
    config: SenderConfig,
    listener: TcpListener,
    entries: Vec<FileEntry>,
    token: String,
    local_ip: Ipv4Addr,
    warnings: WarningSink,
}

impl Sender {
    /// Enumerate inputs, resolve the local endpoint, bind, and mint a
    /// token.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Filesystem`] when enumeration fails or
    /// finds nothing, and [`TransferError::Network`] when the overlay
    /// endpoint is unavailable outside pod mode or the bind fails.
    pub async fn bind(config: SenderConfig) -> Result<Self, TransferError> {
        let warnings = WarningSink::new(&config.working_dir);

        let entries = enumerate(&config.inputs, &config.excludes, &warnings)?;
        if entries.is_empty() {
            return Err(TransferError::Filesystem("nothing to transfer".into()));
        }

        let local_ip = if config.pod_mode {
            Ipv4Addr::LOCALHOST
        } else {
            ferry_overlay::local_endpoint()
                .await
                .ok_or_else(|| TransferError::Network("overlay endpoint unavailable".into()))?
        };

        let bind_ip = if config.pod_mode {
            Ipv4Addr::LOCALHOST
        } else {
            Ipv4Addr::UNSPECIFIED
        };
        let listener = TcpListener::bind((bind_ip, config.port))
            .await
            .map_err(|e| TransferError::Network(format!("bind failed: {e}")))?;

        let token = generate_token();

        Ok(Self {
            config,
            listener,
            entries,
            token,
            local_ip,
            warnings,
        })
    }

    /// The `ip:word-word` string the receiving human needs.
    #[must_use]
    pub fn connection_string(&self) -> ConnectionString {
        ConnectionString::new(self.local_ip, self.token.clone())
    }

    /// Actual bound address (tests bind port 0).
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Network`] if the socket has no address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransferError> {
        Ok(self.listener.local_addr()?)
    }

    /// Enumerated manifest entries, in transfer order.
    #[must_use]
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Accept one peer and run the session to completion.
    ///
    /// # Errors
    ///
    /// Maps one-to-one onto the terminal states: [`TransferError::Network`]
    /// for accept timeout and socket failures,
    /// [`TransferError::Authentication`] for a peer the overlay does not
    /// vouch for (or a non-loopback peer in pod mode),
    /// [`TransferError::Crypto`] and [`TransferError::Protocol`] for
    /// handshake and framing violations, and [`TransferError::Filesystem`]
    /// when a source file cannot be opened.
    pub async fn run(
        self,
        directory: &PeerDirectory,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), TransferError> {
        progress.session_ready(&self.connection_string().to_string());
        tracing::info!("listening on {:?}", self.listener.local_addr());

        let (mut stream, peer_addr) = tokio::time::timeout(ACCEPT_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| TransferError::Network("timed out waiting for receiver".into()))??;
        stream.set_nodelay(true)?;

        self.verify_peer(peer_addr, directory).await?;

        let mut crypto = SessionCrypto::generate();
        handshake_as_sender(&mut stream, &mut crypto, &self.token).await?;

        let mut codec = FrameCodec::for_sender();
        codec.set_compression(self.config.compress);

        let session_id = Uuid::new_v4();
        let manifest = Manifest::new(session_id, self.config.compress, self.entries.clone());
        codec
            .write_frame(&mut stream, &crypto, &Frame::Manifest(manifest))
            .await?;
        tracing::info!(
            "session {session_id}: manifest sent, {} file(s), {} byte(s)",
            self.entries.len(),
            total_size(&self.entries)
        );
        progress.batch_started(self.entries.len() as u64, total_size(&self.entries));

        stream_entries(
            &mut stream,
            &mut codec,
            &crypto,
            &self.entries,
            &self.warnings,
            progress,
        )
        .await?;
        codec
            .write_frame(&mut stream, &crypto, &Frame::EndOfStream)
            .await?;

        self.retry_loop(&mut stream, &mut codec, &crypto, progress)
            .await
    }

    async fn verify_peer(
        &self,
        peer_addr: SocketAddr,
        directory: &PeerDirectory,
    ) -> Result<(), TransferError> {
        let IpAddr::V4(peer_ip) = peer_addr.ip() else {
            return Err(TransferError::Authentication(format!(
                "non-IPv4 peer: {peer_addr}"
            )));
        };

        if self.config.pod_mode {
            if !peer_ip.is_loopback() {
                return Err(TransferError::Authentication(format!(
                    "pod mode requires a loopback peer, got {peer_ip}"
                )));
            }
            return Ok(());
        }

        let (authenticated, hostname) = directory.verify_peer(peer_ip).await;
        if !authenticated {
            self.warnings
                .warn(&format!("rejected unverified peer {peer_ip}"));
            return Err(TransferError::Authentication(format!(
                "peer {peer_ip} is not an authenticated overlay peer"
            )));
        }
        tracing::info!("overlay peer verified: {hostname} ({peer_ip})");
        Ok(())
    }

    /// Wait for the receiver's verdict, re-streaming requested files.
    async fn retry_loop(
        &self,
        stream: &mut TcpStream,
        codec: &mut FrameCodec,
        crypto: &SessionCrypto,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), TransferError> {
        let by_path: HashMap<&str, &FileEntry> = self
            .entries
            .iter()
            .map(|e| (e.path.as_str(), e))
            .collect();

        let mut rounds = 0u32;
        loop {
            let frame = tokio::time::timeout(RETRY_TIMEOUT, codec.read_frame(stream, crypto))
                .await
                .map_err(|_| {
                    TransferError::Network("timed out waiting for receiver verdict".into())
                })??;

            match frame {
                Frame::Ack(AckStatus::Ok) => {
                    tracing::info!("receiver verified all files");
                    return Ok(());
                }
                Frame::Ack(AckStatus::Failed) => {
                    self.warnings
                        .warn("receiver gave up with unverified files");
                    return Ok(());
                }
                Frame::RetryRequest(paths) => {
                    rounds += 1;
                    if rounds > MAX_RETRY_ATTEMPTS {
                        return Err(TransferError::Protocol(
                            "receiver exceeded the retry budget".into(),
                        ));
                    }

                    let mut selected = Vec::with_capacity(paths.len());
                    for path in &paths {
                        let entry = by_path.get(path.as_str()).ok_or_else(|| {
                            TransferError::Protocol(format!("retry for unknown path: {path}"))
                        })?;
                        selected.push((*entry).clone());
                    }

                    tracing::info!("retry round {rounds}: {} file(s)", selected.len());
                    progress.retry_scheduled(&paths);
                    stream_entries(stream, codec, crypto, &selected, &self.warnings, progress)
                        .await?;
                    codec
                        .write_frame(stream, crypto, &Frame::EndOfStream)
                        .await?;
                }
                other => {
                    return Err(TransferError::Protocol(format!(
                        "unexpected frame in retry loop: {other:?}"
                    )));
                }
            }
        }
    }
}

/// Stream entries in order: read through a 1 MiB buffer, hash as a
/// sanity check, frame each chunk at its stream offset.
///
/// A file's bytes may span several frames; a frame never spans two
/// files. If the source shrank since enumeration the remainder is
/// zero-filled so every later entry's stream offset stays aligned; the
/// receiver's hash check then fails the file.
async fn stream_entries(
    stream: &mut TcpStream,
    codec: &mut FrameCodec,
    crypto: &SessionCrypto,
    entries: &[FileEntry],
    warnings: &WarningSink,
    progress: &mut dyn ProgressSink,
) -> Result<(), TransferError> {
    for entry in entries {
        progress.file_started(&entry.path, entry.size);

        let mut file = tokio::fs::File::open(&entry.source).await.map_err(|e| {
            TransferError::Filesystem(format!("cannot open {}: {e}", entry.source.display()))
        })?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; DATA_CHUNK_SIZE];
        let mut sent = 0u64;
        let mut shrunk = false;

        while sent < entry.size {
            let want = (entry.size - sent).min(DATA_CHUNK_SIZE as u64) as usize;
            let n = file.read(&mut buf[..want]).await.map_err(|e| {
                TransferError::Filesystem(format!("read failed on {}: {e}", entry.source.display()))
            })?;

            let len = if n == 0 {
                if !shrunk {
                    shrunk = true;
                    warnings.warn(&format!(
                        "source shrank while streaming, zero-filling: {}",
                        entry.path
                    ));
                }
                buf[..want].fill(0);
                want
            } else {
                n
            };

            codec
                .write_frame(
                    stream,
                    crypto,
                    &Frame::FileData {
                        offset: entry.offset + sent,
                        bytes: buf[..len].to_vec(),
                    },
                )
                .await?;
            hasher.update(&buf[..len]);
            sent += len as u64;
            progress.bytes_transferred(len as u64);
        }

        let digest: [u8; 32] = hasher.finalize().into();
        if digest != entry.hash {
            // The receiver's integrity check will request this file again.
            warnings.warn(&format!("source changed while streaming: {}", entry.path));
        }
    }
    Ok(())
}
