//! Durable resume state (the lock document).
//!
//! The receiver keeps `.transfer_lock.json` in its working directory for
//! the lifetime of a transfer. Every persisted update goes through a
//! sibling temp file, fsync, and rename, so a crash leaves either the
//! previous document or the new one. Progress updates are batched: at
//! most one flush window (2 s / 150 updates) of progress can be lost on
//! unclean shutdown, and resume re-verifies partial content by hash, so
//! the cost of a lost window is retransmission, not corruption.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enumerate::FileEntry;
use crate::warnlog::WarningSink;

/// Lock document file name, relative to the receiver's working directory.
pub const LOCK_FILE: &str = ".transfer_lock.json";

/// Current lock document schema version.
pub const LOCK_VERSION: &str = "1.0";

/// Documents older than this are stale and treated as absent.
const STALE_AFTER_HOURS: i64 = 24;

/// Flush after this many buffered progress updates.
const FLUSH_UPDATE_THRESHOLD: usize = 150;

/// Flush when this much time has passed since the last flush.
const FLUSH_INTERVAL_SECS: u64 = 2;

/// Per-file transfer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Announced, no bytes written yet
    Pending,
    /// Some bytes written, not yet verified
    InProgress,
    /// Fully written and hash-verified
    Completed,
    /// Hash mismatch or unrecoverable per-file error
    Failed,
}

/// Per-file persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    /// Transfer status
    pub status: FileStatus,
    /// Declared file size
    pub size: u64,
    /// SHA-256 announced by the sender
    #[serde(with = "crate::hex_hash")]
    pub source_hash: [u8; 32],
    /// Bytes written to the part file so far
    pub transferred_bytes: u64,
    /// SHA-256 of the first `transferred_bytes` bytes of the part file
    #[serde(
        with = "crate::hex_hash_opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub partial_hash: Option<[u8; 32]>,
    /// Last state change
    pub last_modified: DateTime<Utc>,
}

/// The durable resume document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockDocument {
    /// Schema version, currently `"1.0"`
    pub version: String,
    /// Session that last wrote this document
    pub session_id: Uuid,
    /// Session start time; drives staleness
    pub timestamp: DateTime<Utc>,
    /// Sender address for the session
    pub sender_endpoint: String,
    /// Number of files in the manifest
    pub total_files: u64,
    /// Total stream size in bytes
    pub total_size: u64,
    /// Per-file state keyed by relative path
    pub files: BTreeMap<String, FileState>,
}

/// Resume classification for one session.
#[derive(Debug, Default)]
pub struct ResumePlan {
    /// Verified complete; bytes for these are discarded on the wire
    pub completed: BTreeSet<String>,
    /// Resumable part files: path -> (resume offset, expected partial hash)
    pub partial: BTreeMap<String, (u64, [u8; 32])>,
    /// Everything else starts from scratch
    pub fresh: Vec<String>,
}

/// Owner of the lock document and its batched flush discipline.
pub struct LockManager {
    path: PathBuf,
    doc: LockDocument,
    warnings: WarningSink,
    pending_updates: usize,
    last_flush: Instant,
}

impl LockManager {
    /// Load and validate an existing lock document.
    ///
    /// Returns `None` when the file is absent, unreadable, corrupt, of a
    /// different schema version, or older than 24 hours. Every non-absent
    /// failure is logged; none is fatal.
    pub fn load(dir: &Path, warnings: &WarningSink) -> Option<LockDocument> {
        let path = dir.join(LOCK_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warnings.warn(&format!("lock document unreadable, ignoring: {e}"));
                return None;
            }
        };

        let doc: LockDocument = match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(e) => {
                warnings.warn(&format!("lock document corrupt, ignoring: {e}"));
                return None;
            }
        };

        if doc.version != LOCK_VERSION {
            warnings.warn(&format!(
                "lock document version {} unsupported, ignoring",
                doc.version
            ));
            return None;
        }

        let age = Utc::now().signed_duration_since(doc.timestamp);
        if age > ChronoDuration::hours(STALE_AFTER_HOURS) {
            warnings.warn(&format!(
                "lock document stale ({}h old), ignoring",
                age.num_hours()
            ));
            return None;
        }

        Some(doc)
    }

    /// Classify incoming manifest entries against a prior document.
    ///
    /// `completed` requires a stored completed status and matching source
    /// hash. `partial` requires in-progress status, matching size and
    /// source hash, a recorded partial hash, and a part file on disk of
    /// exactly the recorded length; byte-level verification of the part
    /// content happens lazily at the writer's first chunk. A completed
    /// entry whose source hash changed is logged and forced fresh.
    pub fn classify(
        prior: &LockDocument,
        entries: &[FileEntry],
        dest_root: &Path,
        warnings: &WarningSink,
    ) -> ResumePlan {
        let mut plan = ResumePlan::default();

        for entry in entries {
            let state = prior.files.get(&entry.path);
            match state {
                Some(st) if st.status == FileStatus::Completed => {
                    if st.source_hash == entry.hash {
                        plan.completed.insert(entry.path.clone());
                    } else {
                        warnings.warn(&format!(
                            "source changed since last session, retransferring: {}",
                            entry.path
                        ));
                        plan.fresh.push(entry.path.clone());
                    }
                }
                Some(st)
                    if st.status == FileStatus::InProgress
                        && st.size == entry.size
                        && st.source_hash == entry.hash
                        && st.transferred_bytes > 0
                        && st.transferred_bytes < entry.size =>
                {
                    let part = part_path(dest_root, &entry.path);
                    let on_disk = std::fs::metadata(&part).map(|m| m.len()).ok();
                    match (st.partial_hash, on_disk) {
                        (Some(expected), Some(len)) if len == st.transferred_bytes => {
                            plan.partial
                                .insert(entry.path.clone(), (st.transferred_bytes, expected));
                        }
                        _ => {
                            warnings.warn(&format!(
                                "part file missing or wrong length, restarting: {}",
                                entry.path
                            ));
                            plan.fresh.push(entry.path.clone());
                        }
                    }
                }
                _ => plan.fresh.push(entry.path.clone()),
            }
        }

        plan
    }

    /// Create a fresh document for a new session, all entries pending.
    #[must_use]
    pub fn create(
        dir: &Path,
        session_id: Uuid,
        sender_endpoint: &str,
        entries: &[FileEntry],
        warnings: WarningSink,
    ) -> Self {
        let now = Utc::now();
        let files = entries
            .iter()
            .map(|e| {
                (
                    e.path.clone(),
                    FileState {
                        status: FileStatus::Pending,
                        size: e.size,
                        source_hash: e.hash,
                        transferred_bytes: 0,
                        partial_hash: None,
                        last_modified: now,
                    },
                )
            })
            .collect();

        let doc = LockDocument {
            version: LOCK_VERSION.to_string(),
            session_id,
            timestamp: now,
            sender_endpoint: sender_endpoint.to_string(),
            total_files: entries.len() as u64,
            total_size: entries.iter().map(|e| e.size).sum(),
            files,
        };

        Self {
            path: dir.join(LOCK_FILE),
            doc,
            warnings,
            pending_updates: 0,
            last_flush: Instant::now(),
        }
    }

    /// Carry a resume plan into the fresh document.
    ///
    /// Completed entries keep their verified state; partial entries start
    /// in progress at their resume offset. Flushes immediately so the
    /// on-disk document reflects the adopted plan before any bytes move.
    pub fn apply_plan(&mut self, plan: &ResumePlan) {
        let now = Utc::now();
        for path in &plan.completed {
            if let Some(st) = self.doc.files.get_mut(path) {
                st.status = FileStatus::Completed;
                st.transferred_bytes = st.size;
                st.partial_hash = Some(st.source_hash);
                st.last_modified = now;
            }
        }
        for (path, (resume_bytes, partial_hash)) in &plan.partial {
            if let Some(st) = self.doc.files.get_mut(path) {
                st.status = FileStatus::InProgress;
                st.transferred_bytes = *resume_bytes;
                st.partial_hash = Some(*partial_hash);
                st.last_modified = now;
            }
        }
        self.flush();
    }

    /// Buffered per-chunk progress update.
    ///
    /// `written` is monotonic: a smaller value than already recorded is
    /// ignored. Flushes when 150 updates have accumulated or 2 seconds
    /// have passed since the last flush.
    pub fn record_progress(&mut self, path: &str, written: u64, partial_hash: Option<[u8; 32]>) {
        if let Some(st) = self.doc.files.get_mut(path) {
            if st.status == FileStatus::Pending {
                st.status = FileStatus::InProgress;
            }
            if written > st.transferred_bytes {
                st.transferred_bytes = written;
            }
            if partial_hash.is_some() {
                st.partial_hash = partial_hash;
            }
            st.last_modified = Utc::now();
        }
        self.pending_updates += 1;

        if self.pending_updates >= FLUSH_UPDATE_THRESHOLD
            || self.last_flush.elapsed().as_secs() >= FLUSH_INTERVAL_SECS
        {
            self.flush();
        }
    }

    /// Mark a file verified complete. Status changes flush immediately.
    pub fn mark_completed(&mut self, path: &str) {
        if let Some(st) = self.doc.files.get_mut(path) {
            st.status = FileStatus::Completed;
            st.transferred_bytes = st.size;
            st.partial_hash = Some(st.source_hash);
            st.last_modified = Utc::now();
        }
        self.flush();
    }

    /// Mark a file failed (hash mismatch or per-file I/O error).
    pub fn mark_failed(&mut self, path: &str) {
        if let Some(st) = self.doc.files.get_mut(path) {
            st.status = FileStatus::Failed;
            st.last_modified = Utc::now();
        }
        self.flush();
    }

    /// Reset a file to pending ahead of a retry.
    pub fn mark_pending(&mut self, path: &str) {
        if let Some(st) = self.doc.files.get_mut(path) {
            st.status = FileStatus::Pending;
            st.transferred_bytes = 0;
            st.partial_hash = None;
            st.last_modified = Utc::now();
        }
        self.flush();
    }

    /// Flush on session teardown, success or not.
    pub fn finish(&mut self) {
        self.flush();
    }

    /// Remove the lock document after a fully successful session.
    pub fn cleanup_on_success(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                self.warnings
                    .warn(&format!("could not remove lock document: {e}"));
            }
        }
    }

    /// Current in-memory document.
    #[must_use]
    pub fn document(&self) -> &LockDocument {
        &self.doc
    }

    /// Write the document durably: sibling temp file, fsync, rename.
    ///
    /// A failed write costs durability for this window, not correctness;
    /// it is logged and the session continues.
    fn flush(&mut self) {
        self.pending_updates = 0;
        self.last_flush = Instant::now();

        if let Err(e) = self.write_atomic() {
            self.warnings
                .warn(&format!("lock document write failed: {e}"));
        }
    }

    fn write_atomic(&self) -> std::io::Result<()> {
        let tmp = self.path.with_file_name(format!("{LOCK_FILE}.tmp"));
        let json = serde_json::to_vec_pretty(&self.doc)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)
    }
}

/// Part file path for a manifest entry under the destination root.
#[must_use]
pub fn part_path(dest_root: &Path, rel: &str) -> PathBuf {
    let mut name = dest_root.join(rel).into_os_string();
    name.push(".part");
    PathBuf::from(name)
}
