//! Shared helpers for ferry integration tests.
//!
//! Sessions run in pod mode over loopback TCP with ephemeral ports, so
//! the suite needs neither the overlay CLI nor the fixed transfer port.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use ferry_core::{
    run_receiver, NullProgress, ProgressSink, ReceiverConfig, Sender, SenderConfig, TransferError,
};
use ferry_overlay::PeerDirectory;

/// SHA-256 of a byte slice.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 of a file on disk.
pub fn sha256_file(path: &Path) -> [u8; 32] {
    sha256(&std::fs::read(path).unwrap())
}

/// Lowercase hex of a digest.
pub fn to_hex(bytes: [u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Deterministic pseudo-random content for test payloads.
pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u64).wrapping_mul(31).wrapping_add(seed as u64) as u8)
        .collect()
}

/// Knobs for a pod-mode transfer.
#[derive(Clone, Copy, Default)]
pub struct TransferOpts {
    pub compress: bool,
    pub overwrite: bool,
    pub decline_resume: bool,
}

/// Outcome of both sides of a session.
pub struct TransferOutcome {
    pub sender: Result<(), TransferError>,
    pub receiver: Result<(), TransferError>,
}

impl TransferOutcome {
    pub fn assert_ok(&self) {
        assert!(self.sender.is_ok(), "sender failed: {:?}", self.sender);
        assert!(self.receiver.is_ok(), "receiver failed: {:?}", self.receiver);
    }
}

/// Run one complete pod-mode session over loopback.
pub async fn pod_transfer(
    inputs: Vec<PathBuf>,
    send_dir: &Path,
    recv_dir: &Path,
    opts: TransferOpts,
) -> TransferOutcome {
    let mut sink = NullProgress;
    pod_transfer_observed(inputs, send_dir, recv_dir, opts, &mut sink).await
}

/// Same as [`pod_transfer`] with a caller-supplied receiver-side
/// progress sink, for tests that count events.
pub async fn pod_transfer_observed(
    inputs: Vec<PathBuf>,
    send_dir: &Path,
    recv_dir: &Path,
    opts: TransferOpts,
    receiver_progress: &mut dyn ProgressSink,
) -> TransferOutcome {
    let mut config = SenderConfig::new(inputs);
    config.pod_mode = true;
    config.port = 0;
    config.compress = opts.compress;
    config.working_dir = send_dir.to_path_buf();

    let sender = Sender::bind(config).await.expect("sender bind");
    let port = sender.local_addr().unwrap().port();
    let target = sender.connection_string();

    let sender_task = tokio::spawn(async move {
        let directory = PeerDirectory::new();
        let mut progress = NullProgress;
        sender.run(&directory, &mut progress).await
    });

    let mut config = ReceiverConfig::new(target);
    config.pod_mode = true;
    config.port = port;
    config.dest_dir = recv_dir.to_path_buf();
    config.overwrite = opts.overwrite;
    config.resume = !opts.decline_resume;

    let directory = PeerDirectory::new();
    let receiver = run_receiver(config, &directory, receiver_progress).await;
    let sender = sender_task.await.expect("sender task panicked");

    TransferOutcome { sender, receiver }
}

/// Receiver-side sink that records retry rounds.
#[derive(Default)]
pub struct RetryCounter {
    pub rounds: Vec<Vec<String>>,
}

impl ProgressSink for RetryCounter {
    fn retry_scheduled(&mut self, paths: &[String]) {
        self.rounds.push(paths.to_vec());
    }
}
