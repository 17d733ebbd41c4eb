//! Receiver engine.
//!
//! Connects to the announced sender, runs the handshake, validates the
//! manifest, plans resume against the lock document, then drives one
//! file writer per live entry through the write loop. Writers are
//! addressed by stream offset, not arrival order, so completed regions
//! are discarded locally and a resumed file's already-verified prefix is
//! simply skipped. Failed files are collected at end of stream and
//! requested again, up to three rounds.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::TcpStream;
use tokio::time::timeout;

use ferry_crypto::SessionCrypto;
use ferry_files::enumerate::FileEntry;
use ferry_files::fdmon::check_fd_headroom;
use ferry_files::lock::ResumePlan;
use ferry_files::writer::{ChunkOutcome, OpenOutcome};
use ferry_files::{FileWriter, LockManager, WarningSink};
use ferry_overlay::PeerDirectory;

use crate::error::TransferError;
use crate::frame::{AckStatus, Frame, FrameCodec};
use crate::manifest::Manifest;
use crate::progress::ProgressSink;
use crate::session::{
    handshake_as_receiver, ConnectionString, CONNECT_TIMEOUT, DATA_TIMEOUT, MANIFEST_TIMEOUT,
    MAX_RETRY_ATTEMPTS, TRANSFER_PORT,
};

/// Receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Parsed `ip:token` from the sending human
    pub target: ConnectionString,
    /// Pod mode: require loopback, skip overlay verification
    pub pod_mode: bool,
    /// Sender port; the fixed transfer port unless overridden
    pub port: u16,
    /// Destination root (and home of the lock document)
    pub dest_dir: PathBuf,
    /// Replace existing files instead of suffixing
    pub overwrite: bool,
    /// Continue from a valid lock document when one exists
    pub resume: bool,
}

impl ReceiverConfig {
    /// Config with defaults for everything but the target.
    #[must_use]
    pub fn new(target: ConnectionString) -> Self {
        Self {
            target,
            pod_mode: false,
            port: TRANSFER_PORT,
            dest_dir: PathBuf::from("."),
            overwrite: false,
            resume: true,
        }
    }
}

/// How the receiver handles one manifest entry's byte range.
enum Slot {
    /// Verified complete in a previous session; bytes are discarded
    Skip,
    /// Live writer
    Writer(FileWriter),
}

/// Run a receive session to completion.
///
/// # Errors
///
/// Maps one-to-one onto the terminal states, per the recovery policy:
/// session-level failures ([`TransferError::Network`],
/// [`TransferError::Authentication`], [`TransferError::Crypto`],
/// [`TransferError::Protocol`], [`TransferError::PathUnsafe`]) abort and
/// preserve the lock for a future resume;
/// [`TransferError::Integrity`] reports files still unverified after the
/// retry budget. The lock document is removed only on full success.
pub async fn run_receiver(
    config: ReceiverConfig,
    directory: &PeerDirectory,
    progress: &mut dyn ProgressSink,
) -> Result<(), TransferError> {
    let warnings = WarningSink::new(&config.dest_dir);

    verify_sender(&config, directory, &warnings).await?;

    let addr = SocketAddr::from((config.target.ip, config.port));
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| TransferError::Network(format!("connect to {addr} timed out")))?
        .map_err(|e| TransferError::Network(format!("connect to {addr} failed: {e}")))?;
    stream.set_nodelay(true)?;

    let mut crypto = SessionCrypto::generate();
    handshake_as_receiver(&mut stream, &mut crypto, &config.target.token).await?;

    let mut codec = FrameCodec::for_receiver();
    let first = timeout(MANIFEST_TIMEOUT, codec.read_frame(&mut stream, &crypto))
        .await
        .map_err(|_| TransferError::Network("timed out waiting for manifest".into()))??;
    let Frame::Manifest(mut manifest) = first else {
        return Err(TransferError::Protocol(
            "expected manifest as first frame".into(),
        ));
    };
    manifest.validate()?;
    codec.set_compression(manifest.compression);
    tracing::info!(
        "session {}: manifest of {} file(s), {} byte(s), compression={}",
        manifest.session_id,
        manifest.entries.len(),
        manifest.total_size(),
        manifest.compression
    );
    progress.batch_started(manifest.entries.len() as u64, manifest.total_size());
    check_fd_headroom(manifest.entries.len() as u64, &warnings);

    let plan = match LockManager::load(&config.dest_dir, &warnings) {
        Some(prior) if config.resume => {
            let plan =
                LockManager::classify(&prior, &manifest.entries, &config.dest_dir, &warnings);
            tracing::info!(
                "resume plan: {} complete, {} partial, {} fresh",
                plan.completed.len(),
                plan.partial.len(),
                plan.fresh.len()
            );
            plan
        }
        Some(_) => {
            tracing::info!("continuation declined, starting fresh");
            ResumePlan::default()
        }
        None => ResumePlan::default(),
    };

    let sender_endpoint = format!("{}:{}", config.target.ip, config.port);
    let mut lock = LockManager::create(
        &config.dest_dir,
        manifest.session_id,
        &sender_endpoint,
        &manifest.entries,
        warnings.clone(),
    );
    lock.apply_plan(&plan);

    let result = run_session(
        &mut stream,
        &mut codec,
        &crypto,
        &manifest,
        &plan,
        &mut lock,
        &config,
        &warnings,
        progress,
    )
    .await;
    lock.finish();

    match result {
        Ok(0) => {
            lock.cleanup_on_success();
            Ok(())
        }
        Ok(failed) => Err(TransferError::Integrity(failed)),
        Err(e) => Err(e),
    }
}

async fn verify_sender(
    config: &ReceiverConfig,
    directory: &PeerDirectory,
    warnings: &WarningSink,
) -> Result<(), TransferError> {
    if config.pod_mode {
        if !config.target.ip.is_loopback() {
            return Err(TransferError::Authentication(format!(
                "pod mode requires a loopback sender, got {}",
                config.target.ip
            )));
        }
        return Ok(());
    }

    let (authenticated, hostname) = directory.verify_peer(config.target.ip).await;
    if !authenticated {
        warnings.warn(&format!(
            "refusing unverified sender {}",
            config.target.ip
        ));
        return Err(TransferError::Authentication(format!(
            "sender {} is not an authenticated overlay peer",
            config.target.ip
        )));
    }
    tracing::info!("overlay sender verified: {hostname} ({})", config.target.ip);
    Ok(())
}

/// Write loop plus retry rounds. Returns the count of files still
/// failed after the retry budget (zero on full success).
#[allow(clippy::too_many_arguments)]
async fn run_session(
    stream: &mut TcpStream,
    codec: &mut FrameCodec,
    crypto: &SessionCrypto,
    manifest: &Manifest,
    plan: &ResumePlan,
    lock: &mut LockManager,
    config: &ReceiverConfig,
    warnings: &WarningSink,
    progress: &mut dyn ProgressSink,
) -> Result<usize, TransferError> {
    let mut slots = build_slots(manifest, plan, lock, config, warnings, progress)?;

    let mut attempts = 0u32;
    loop {
        receive_pass(stream, codec, crypto, &manifest.entries, &mut slots, lock, progress).await?;

        // Anything not terminal at end of stream is short on bytes;
        // complete() fails it on the hash check.
        for slot in &mut slots {
            if let Slot::Writer(writer) = slot {
                if !writer.is_terminal() {
                    warnings.warn(&format!(
                        "incomplete at end of stream: {}",
                        writer.rel_path()
                    ));
                    writer.complete(lock)?;
                }
            }
        }

        let failed: Vec<String> = slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Writer(w) if w.is_failed() => Some(w.rel_path().to_string()),
                _ => None,
            })
            .collect();

        if failed.is_empty() {
            codec
                .write_frame(stream, crypto, &Frame::Ack(AckStatus::Ok))
                .await?;
            return Ok(0);
        }

        if attempts >= MAX_RETRY_ATTEMPTS {
            warnings.warn(&format!(
                "{} file(s) unverified after {attempts} retry round(s)",
                failed.len()
            ));
            codec
                .write_frame(stream, crypto, &Frame::Ack(AckStatus::Failed))
                .await?;
            return Ok(failed.len());
        }

        attempts += 1;
        for slot in &mut slots {
            if let Slot::Writer(writer) = slot {
                if writer.is_failed() {
                    writer.reset_for_retry(lock);
                }
            }
        }
        tracing::info!(
            "requesting retry round {attempts} for {} file(s)",
            failed.len()
        );
        progress.retry_scheduled(&failed);
        codec
            .write_frame(stream, crypto, &Frame::RetryRequest(failed))
            .await?;
    }
}

fn build_slots(
    manifest: &Manifest,
    plan: &ResumePlan,
    lock: &mut LockManager,
    config: &ReceiverConfig,
    warnings: &WarningSink,
    progress: &mut dyn ProgressSink,
) -> Result<Vec<Slot>, TransferError> {
    let mut slots = Vec::with_capacity(manifest.entries.len());
    for entry in &manifest.entries {
        if plan.completed.contains(&entry.path) {
            progress.bytes_transferred(entry.size);
            progress.file_finished(&entry.path);
            slots.push(Slot::Skip);
            continue;
        }

        let mut writer = FileWriter::new(&config.dest_dir, entry, config.overwrite, warnings.clone());
        match writer.open(plan.partial.get(&entry.path).copied(), lock)? {
            OpenOutcome::Resumed(n) => progress.bytes_transferred(n),
            OpenOutcome::AlreadyComplete => progress.file_finished(&entry.path),
            OpenOutcome::Fresh => {}
        }

        // Zero-length files never see a data frame.
        if entry.size == 0 && !writer.is_terminal() {
            writer.complete(lock)?;
            progress.file_finished(&entry.path);
        }

        slots.push(Slot::Writer(writer));
    }
    Ok(slots)
}

/// Read frames until end-of-stream, routing each chunk by offset.
async fn receive_pass(
    stream: &mut TcpStream,
    codec: &mut FrameCodec,
    crypto: &SessionCrypto,
    entries: &[FileEntry],
    slots: &mut [Slot],
    lock: &mut LockManager,
    progress: &mut dyn ProgressSink,
) -> Result<(), TransferError> {
    loop {
        let frame = timeout(DATA_TIMEOUT, codec.read_frame(stream, crypto))
            .await
            .map_err(|_| TransferError::Network("timed out waiting for data".into()))??;

        match frame {
            Frame::FileData { offset, bytes } => {
                dispatch_chunk(entries, slots, lock, offset, &bytes, progress)?;
            }
            Frame::EndOfStream => return Ok(()),
            other => {
                return Err(TransferError::Protocol(format!(
                    "unexpected frame in write loop: {other:?}"
                )));
            }
        }
    }
}

/// Route one chunk to the writer owning its offset range.
///
/// Bytes for skipped or already-failed files are discarded. A chunk
/// overlapping bytes the writer already holds (the resumed prefix, or a
/// duplicate delivery) is trimmed; what remains must land exactly at the
/// writer's append position.
fn dispatch_chunk(
    entries: &[FileEntry],
    slots: &mut [Slot],
    lock: &mut LockManager,
    offset: u64,
    bytes: &[u8],
    progress: &mut dyn ProgressSink,
) -> Result<(), TransferError> {
    if bytes.is_empty() {
        return Ok(());
    }

    let idx = locate_entry(entries, offset)?;
    let entry = &entries[idx];
    let end = offset
        .checked_add(bytes.len() as u64)
        .ok_or_else(|| TransferError::Protocol("data frame offset overflow".into()))?;
    if end > entry.offset + entry.size {
        return Err(TransferError::Protocol(format!(
            "data frame crosses file boundary at offset {offset}"
        )));
    }

    let Slot::Writer(writer) = &mut slots[idx] else {
        return Ok(());
    };
    if writer.is_terminal() {
        return Ok(());
    }

    let mut pos = offset - entry.offset;
    let mut data = bytes;
    let have = writer.written();
    if pos < have {
        let overlap = (have - pos).min(data.len() as u64) as usize;
        data = &data[overlap..];
        pos += overlap as u64;
    }
    if data.is_empty() {
        return Ok(());
    }
    if pos != writer.written() {
        return Err(TransferError::Protocol(format!(
            "data gap for {}: frame at {pos}, writer at {}",
            writer.rel_path(),
            writer.written()
        )));
    }

    progress.bytes_transferred(data.len() as u64);
    match writer.write_chunk(data, lock)? {
        ChunkOutcome::Completed(_) => progress.file_finished(writer.rel_path()),
        ChunkOutcome::Failed | ChunkOutcome::InProgress => {}
    }
    Ok(())
}

/// Binary-search the entry whose byte range contains `offset`.
/// Zero-length entries have empty ranges and never match.
fn locate_entry(entries: &[FileEntry], offset: u64) -> Result<usize, TransferError> {
    let mut i = entries.partition_point(|e| e.offset <= offset);
    while i > 0 {
        i -= 1;
        let entry = &entries[i];
        if entry.size == 0 {
            continue;
        }
        if offset >= entry.offset && offset < entry.offset + entry.size {
            return Ok(i);
        }
        break;
    }
    Err(TransferError::Protocol(format!(
        "data frame offset {offset} out of range"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn entry(path: &str, size: u64, offset: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size,
            hash: [0u8; 32],
            offset,
            source: PathBuf::new(),
        }
    }

    #[test]
    fn test_locate_entry_by_range() {
        let entries = vec![
            entry("a", 10, 0),
            entry("b", 0, 10),
            entry("c", 5, 10),
            entry("d", 100, 15),
        ];

        assert_eq!(locate_entry(&entries, 0).unwrap(), 0);
        assert_eq!(locate_entry(&entries, 9).unwrap(), 0);
        assert_eq!(locate_entry(&entries, 10).unwrap(), 2);
        assert_eq!(locate_entry(&entries, 14).unwrap(), 2);
        assert_eq!(locate_entry(&entries, 15).unwrap(), 3);
        assert_eq!(locate_entry(&entries, 114).unwrap(), 3);
        assert!(locate_entry(&entries, 115).is_err());
    }

    #[test]
    fn test_locate_entry_empty_manifest() {
        assert!(locate_entry(&[], 0).is_err());
    }

    #[test]
    fn test_pod_mode_rejects_remote_sender() {
        let config = ReceiverConfig {
            pod_mode: true,
            ..ReceiverConfig::new(ConnectionString::new(
                Ipv4Addr::new(100, 64, 0, 9),
                "ocean-tiger".into(),
            ))
        };
        let directory = PeerDirectory::new();
        let warnings = WarningSink::new(&config.dest_dir);

        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(verify_sender(&config, &directory, &warnings));
        assert!(matches!(result, Err(TransferError::Authentication(_))));
    }
}
