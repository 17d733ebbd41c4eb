//! Per-file incremental writer.
//!
//! A writer owns one `.part` file on disk and the running SHA-256 of its
//! content. Chunks are appended with an open-write-close per call, so no
//! descriptor survives across chunk boundaries and receiver descriptor
//! use stays constant regardless of file count. Completion verifies the
//! running hash against the announced source hash and renames the part
//! file into place atomically, probing `name_1.ext`, `name_2.ext`, ...
//! when the target exists and overwrite mode is off.
//!
//! Resume verification is lazy: an accepted part file is re-read into
//! the hasher at the first chunk and checked against the recorded
//! partial hash then, not at planning time.

use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::enumerate::FileEntry;
use crate::error::FileError;
use crate::lock::{part_path, LockManager};
use crate::warnlog::WarningSink;
use crate::READ_BUF_SIZE;

/// Outcome of [`FileWriter::open`].
#[derive(Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Starting from byte zero
    Fresh,
    /// Resuming an accepted part file at this offset
    Resumed(u64),
    /// The part file already held the complete, verified content
    AlreadyComplete,
}

/// Outcome of feeding a chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More bytes expected
    InProgress,
    /// File completed and renamed to this path
    Completed(PathBuf),
    /// File failed (hash mismatch, resume mismatch, or I/O error);
    /// the session continues and the file can be retried
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Active,
    Completed,
    Failed,
}

/// Incremental writer for one manifest entry.
pub struct FileWriter {
    rel_path: String,
    final_path: PathBuf,
    part_path: PathBuf,
    size: u64,
    source_hash: [u8; 32],
    manifest_offset: u64,
    resume_offset: u64,
    expected_partial: Option<[u8; 32]>,
    written: u64,
    hasher: Sha256,
    needs_rehash: bool,
    overwrite: bool,
    state: WriterState,
    warnings: WarningSink,
}

impl FileWriter {
    /// Create a writer for `entry` under `dest_root`.
    #[must_use]
    pub fn new(dest_root: &Path, entry: &FileEntry, overwrite: bool, warnings: WarningSink) -> Self {
        Self {
            rel_path: entry.path.clone(),
            final_path: dest_root.join(&entry.path),
            part_path: part_path(dest_root, &entry.path),
            size: entry.size,
            source_hash: entry.hash,
            manifest_offset: entry.offset,
            resume_offset: 0,
            expected_partial: None,
            written: 0,
            hasher: Sha256::new(),
            needs_rehash: false,
            overwrite,
            state: WriterState::Idle,
            warnings,
        }
    }

    /// Manifest-relative path this writer is responsible for.
    #[must_use]
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// Declared file size.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset of this file's first byte in the concatenated stream.
    #[must_use]
    pub fn manifest_offset(&self) -> u64 {
        self.manifest_offset
    }

    /// Bytes skipped at the front of the file because they survived a
    /// previous session.
    #[must_use]
    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    /// Bytes accounted for so far, including resumed ones.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Whether the writer reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, WriterState::Completed | WriterState::Failed)
    }

    /// Whether the file completed and was renamed into place.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == WriterState::Completed
    }

    /// Whether the file failed and should be retried.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == WriterState::Failed
    }

    /// Open the writer, adopting or discarding any pre-existing part file.
    ///
    /// With `resume = None` (or a zero offset) any stale part file is
    /// deleted and writing starts fresh. With a resume offset, the part
    /// file is accepted only if its on-disk length matches exactly;
    /// content verification is deferred to the first chunk via the
    /// rehash flag. A resume offset equal to the file size short-circuits:
    /// the part file is hashed in full and completed on the spot if it
    /// matches the source hash.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::Io`] when parent directories cannot be
    /// created or the part file cannot be inspected or removed.
    pub fn open(
        &mut self,
        resume: Option<(u64, [u8; 32])>,
        lock: &mut LockManager,
    ) -> Result<OpenOutcome, FileError> {
        if let Some(parent) = self.final_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FileError::io(parent, e))?;
        }
        self.state = WriterState::Active;

        let (resume_bytes, expected) = match resume {
            Some((n, expected)) if n > 0 => (n, expected),
            _ => return self.start_fresh(),
        };

        let on_disk = match std::fs::metadata(&self.part_path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                self.warnings.warn(&format!(
                    "part file missing for resume, starting fresh: {}",
                    self.rel_path
                ));
                return self.start_fresh();
            }
        };

        if on_disk != resume_bytes {
            self.warnings.warn(&format!(
                "part file length {} does not match recorded {} for {}, starting fresh",
                on_disk, resume_bytes, self.rel_path
            ));
            return self.start_fresh();
        }

        if resume_bytes == self.size {
            // Whole file already on disk: verify now rather than lazily.
            let hasher = fold_file(&self.part_path, self.size)?;
            let digest: [u8; 32] = hasher.clone().finalize().into();
            if digest == self.source_hash {
                self.written = self.size;
                self.resume_offset = self.size;
                self.hasher = hasher;
                return match self.complete(lock)? {
                    ChunkOutcome::Completed(_) => Ok(OpenOutcome::AlreadyComplete),
                    _ => Ok(OpenOutcome::Fresh),
                };
            }
            self.warnings.warn(&format!(
                "full part file does not match source hash, starting fresh: {}",
                self.rel_path
            ));
            return self.start_fresh();
        }

        self.written = resume_bytes;
        self.resume_offset = resume_bytes;
        self.expected_partial = Some(expected);
        self.needs_rehash = true;
        Ok(OpenOutcome::Resumed(resume_bytes))
    }

    fn start_fresh(&mut self) -> Result<OpenOutcome, FileError> {
        match std::fs::remove_file(&self.part_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(FileError::io(&self.part_path, e)),
        }
        self.written = 0;
        self.resume_offset = 0;
        self.expected_partial = None;
        self.needs_rehash = false;
        self.hasher = Sha256::new();
        Ok(OpenOutcome::Fresh)
    }

    /// Append one chunk.
    ///
    /// The first chunk after a resumed open folds the existing part file
    /// into the running hasher and checks it against the recorded partial
    /// hash; a mismatch fails the file (it will be retried from scratch).
    /// Per-chunk I/O errors likewise fail the file rather than the
    /// session. Reports progress to the lock manager, which batches
    /// durable writes. Completes the file when the last byte arrives.
    ///
    /// # Errors
    ///
    /// This method maps per-file I/O errors to `Ok(ChunkOutcome::Failed)`
    /// by contract; `Err` is reserved for logic violations, specifically
    /// [`FileError::Overrun`] when a chunk would pass the declared size.
    pub fn write_chunk(
        &mut self,
        bytes: &[u8],
        lock: &mut LockManager,
    ) -> Result<ChunkOutcome, FileError> {
        if self.is_terminal() {
            return Ok(if self.is_failed() {
                ChunkOutcome::Failed
            } else {
                ChunkOutcome::Completed(self.final_path.clone())
            });
        }

        if self.written + bytes.len() as u64 > self.size {
            return Err(FileError::Overrun(self.rel_path.clone()));
        }

        if self.needs_rehash {
            if let Err(outcome) = self.fold_existing_part(lock) {
                return Ok(outcome);
            }
        }

        let append = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.part_path)
            .and_then(|mut f| std::io::Write::write_all(&mut f, bytes));
        if let Err(e) = append {
            self.warnings.warn(&format!(
                "write failed for {}, marking failed: {e}",
                self.rel_path
            ));
            self.state = WriterState::Failed;
            lock.mark_failed(&self.rel_path);
            return Ok(ChunkOutcome::Failed);
        }

        self.hasher.update(bytes);
        self.written += bytes.len() as u64;

        let partial: [u8; 32] = self.hasher.clone().finalize().into();
        lock.record_progress(&self.rel_path, self.written, Some(partial));

        if self.written == self.size {
            return self.complete(lock);
        }
        Ok(ChunkOutcome::InProgress)
    }

    /// Read the resumed part file into the hasher and verify it.
    fn fold_existing_part(&mut self, lock: &mut LockManager) -> Result<(), ChunkOutcome> {
        self.needs_rehash = false;

        match fold_file(&self.part_path, self.resume_offset) {
            Ok(hasher) => {
                let digest: [u8; 32] = hasher.clone().finalize().into();
                if Some(digest) != self.expected_partial {
                    self.warnings.warn(&format!(
                        "resumed part content does not match recorded partial hash, \
                         will retry from scratch: {}",
                        self.rel_path
                    ));
                    self.state = WriterState::Failed;
                    lock.mark_failed(&self.rel_path);
                    return Err(ChunkOutcome::Failed);
                }
                self.hasher = hasher;
                Ok(())
            }
            Err(e) => {
                self.warnings.warn(&format!(
                    "could not re-read part file for {}: {e}",
                    self.rel_path
                ));
                self.state = WriterState::Failed;
                lock.mark_failed(&self.rel_path);
                Err(ChunkOutcome::Failed)
            }
        }
    }

    /// Verify the running hash and rename the part file into place.
    ///
    /// On hash mismatch the part file stays on disk for inspection and
    /// the file is marked failed. On rename failure with overwrite mode
    /// the suffix scheme is tried before giving up.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::Io`] only for errors outside the per-file
    /// recovery contract (zero-size part creation).
    pub fn complete(&mut self, lock: &mut LockManager) -> Result<ChunkOutcome, FileError> {
        let digest: [u8; 32] = self.hasher.clone().finalize().into();
        if digest != self.source_hash {
            self.warnings.warn(&format!(
                "hash mismatch after transfer: {}",
                self.rel_path
            ));
            self.state = WriterState::Failed;
            lock.mark_failed(&self.rel_path);
            return Ok(ChunkOutcome::Failed);
        }

        // Zero-length files never saw a chunk, so the part file may not exist.
        if self.size == 0 && !self.part_path.exists() {
            std::fs::File::create(&self.part_path)
                .map_err(|e| FileError::io(&self.part_path, e))?;
        }

        let target = self.resolve_target();
        if let Err(e) = std::fs::rename(&self.part_path, &target) {
            if self.overwrite {
                // Replacement failed; fall back to the suffix scheme.
                let fallback = next_free_name(&self.final_path);
                if let Err(e2) = std::fs::rename(&self.part_path, &fallback) {
                    self.warnings.warn(&format!(
                        "could not place {}: {e}; fallback failed: {e2}",
                        self.rel_path
                    ));
                    self.state = WriterState::Failed;
                    lock.mark_failed(&self.rel_path);
                    return Ok(ChunkOutcome::Failed);
                }
                self.state = WriterState::Completed;
                lock.mark_completed(&self.rel_path);
                return Ok(ChunkOutcome::Completed(fallback));
            }
            self.warnings.warn(&format!(
                "could not place {}: {e}",
                self.rel_path
            ));
            self.state = WriterState::Failed;
            lock.mark_failed(&self.rel_path);
            return Ok(ChunkOutcome::Failed);
        }

        self.state = WriterState::Completed;
        lock.mark_completed(&self.rel_path);
        Ok(ChunkOutcome::Completed(target))
    }

    /// Delete the part file and reset for a selective retry.
    pub fn reset_for_retry(&mut self, lock: &mut LockManager) {
        match std::fs::remove_file(&self.part_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                self.warnings.warn(&format!(
                    "could not remove part file for retry of {}: {e}",
                    self.rel_path
                ));
            }
        }
        self.hasher = Sha256::new();
        self.written = 0;
        self.resume_offset = 0;
        self.expected_partial = None;
        self.needs_rehash = false;
        self.state = WriterState::Active;
        lock.mark_pending(&self.rel_path);
    }

    /// Final path, with conflict resolution when not overwriting.
    fn resolve_target(&self) -> PathBuf {
        if self.overwrite || !self.final_path.exists() {
            return self.final_path.clone();
        }
        next_free_name(&self.final_path)
    }
}

/// Probe `name_1.ext`, `name_2.ext`, ... for the first free slot.
fn next_free_name(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for n in 1u32.. {
        let name = match &ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("u32 suffix space exhausted")
}

/// Fold the first `size` bytes of a file into a fresh hasher.
fn fold_file(path: &Path, size: u64) -> Result<Sha256, FileError> {
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(path).map_err(|e| FileError::io(path, e))?;
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..want]).map_err(|e| FileError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sha256(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn entry_for(path: &str, content: &[u8], offset: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size: content.len() as u64,
            hash: sha256(content),
            offset,
            source: PathBuf::new(),
        }
    }

    fn fixture(dir: &TempDir, entries: &[FileEntry]) -> (LockManager, WarningSink) {
        let warnings = WarningSink::new(dir.path());
        let lock = LockManager::create(
            dir.path(),
            Uuid::new_v4(),
            "100.64.0.7:15820",
            entries,
            warnings.clone(),
        );
        (lock, warnings)
    }

    #[test]
    fn test_fresh_write_and_complete() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("out/data.bin", b"hello world", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));
        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);

        assert_eq!(writer.open(None, &mut lock).unwrap(), OpenOutcome::Fresh);
        assert_eq!(
            writer.write_chunk(b"hello ", &mut lock).unwrap(),
            ChunkOutcome::InProgress
        );
        let outcome = writer.write_chunk(b"world", &mut lock).unwrap();
        let target = dir.path().join("out/data.bin");
        assert_eq!(outcome, ChunkOutcome::Completed(target.clone()));

        assert_eq!(std::fs::read(&target).unwrap(), b"hello world");
        assert!(!part_path(dir.path(), "out/data.bin").exists());
        assert!(writer.is_completed());
        assert_eq!(
            lock.document().files["out/data.bin"].status,
            crate::lock::FileStatus::Completed
        );
    }

    #[test]
    fn test_hash_mismatch_leaves_part_and_fails() {
        let dir = TempDir::new().unwrap();
        let mut entry = entry_for("bad.bin", b"expected", 0);
        entry.hash = sha256(b"something else");
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));
        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);

        writer.open(None, &mut lock).unwrap();
        let outcome = writer.write_chunk(b"expected", &mut lock).unwrap();
        assert_eq!(outcome, ChunkOutcome::Failed);
        assert!(writer.is_failed());
        assert!(part_path(dir.path(), "bad.bin").exists());
        assert!(!dir.path().join("bad.bin").exists());
    }

    #[test]
    fn test_resume_with_lazy_rehash() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("resume.bin", b"0123456789", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        std::fs::write(part_path(dir.path(), "resume.bin"), b"01234").unwrap();

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        let outcome = writer
            .open(Some((5, sha256(b"01234"))), &mut lock)
            .unwrap();
        assert_eq!(outcome, OpenOutcome::Resumed(5));
        assert_eq!(writer.written(), 5);

        let outcome = writer.write_chunk(b"56789", &mut lock).unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Completed(dir.path().join("resume.bin"))
        );
        assert_eq!(
            std::fs::read(dir.path().join("resume.bin")).unwrap(),
            b"0123456789"
        );
    }

    #[test]
    fn test_resume_rehash_mismatch_fails_file() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("resume.bin", b"0123456789", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        // Content differs from what the recorded partial hash covers
        std::fs::write(part_path(dir.path(), "resume.bin"), b"XXXXX").unwrap();

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        writer
            .open(Some((5, sha256(b"01234"))), &mut lock)
            .unwrap();
        let outcome = writer.write_chunk(b"56789", &mut lock).unwrap();
        assert_eq!(outcome, ChunkOutcome::Failed);
        assert!(writer.is_failed());
    }

    #[test]
    fn test_resume_length_mismatch_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("resume.bin", b"0123456789", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        std::fs::write(part_path(dir.path(), "resume.bin"), b"0123").unwrap();

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        let outcome = writer
            .open(Some((5, sha256(b"01234"))), &mut lock)
            .unwrap();
        assert_eq!(outcome, OpenOutcome::Fresh);
        assert!(!part_path(dir.path(), "resume.bin").exists());
    }

    #[test]
    fn test_full_part_file_completes_at_open() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("whole.bin", b"complete content", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        std::fs::write(part_path(dir.path(), "whole.bin"), b"complete content").unwrap();

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        let outcome = writer
            .open(Some((16, sha256(b"complete content"))), &mut lock)
            .unwrap();
        assert_eq!(outcome, OpenOutcome::AlreadyComplete);
        assert!(writer.is_completed());
        assert_eq!(
            std::fs::read(dir.path().join("whole.bin")).unwrap(),
            b"complete content"
        );
    }

    #[test]
    fn test_conflict_suffix_probing() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("report.txt", b"new", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        std::fs::write(dir.path().join("report.txt"), b"old").unwrap();
        std::fs::write(dir.path().join("report_1.txt"), b"older").unwrap();

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        writer.open(None, &mut lock).unwrap();
        let outcome = writer.write_chunk(b"new", &mut lock).unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Completed(dir.path().join("report_2.txt"))
        );
        assert_eq!(std::fs::read(dir.path().join("report.txt")).unwrap(), b"old");
        assert_eq!(
            std::fs::read(dir.path().join("report_2.txt")).unwrap(),
            b"new"
        );
    }

    #[test]
    fn test_overwrite_mode_replaces() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("report.txt", b"new", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        std::fs::write(dir.path().join("report.txt"), b"old").unwrap();

        let mut writer = FileWriter::new(dir.path(), &entry, true, warnings);
        writer.open(None, &mut lock).unwrap();
        let outcome = writer.write_chunk(b"new", &mut lock).unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Completed(dir.path().join("report.txt"))
        );
        assert_eq!(std::fs::read(dir.path().join("report.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_zero_size_file_completes_without_chunks() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("empty.txt", b"", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        writer.open(None, &mut lock).unwrap();
        let outcome = writer.complete(&mut lock).unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Completed(dir.path().join("empty.txt"))
        );
        assert_eq!(std::fs::read(dir.path().join("empty.txt")).unwrap(), b"");
    }

    #[test]
    fn test_reset_for_retry() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("retry.bin", b"abcdef", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        writer.open(None, &mut lock).unwrap();
        writer.write_chunk(b"abc", &mut lock).unwrap();
        assert!(part_path(dir.path(), "retry.bin").exists());

        writer.reset_for_retry(&mut lock);
        assert_eq!(writer.written(), 0);
        assert!(!part_path(dir.path(), "retry.bin").exists());
        assert_eq!(
            lock.document().files["retry.bin"].status,
            crate::lock::FileStatus::Pending
        );

        // Full content arrives on the retry pass
        let outcome = writer.write_chunk(b"abcdef", &mut lock).unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Completed(dir.path().join("retry.bin"))
        );
    }

    #[test]
    fn test_overrun_is_a_logic_error() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("small.bin", b"ab", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        writer.open(None, &mut lock).unwrap();
        assert!(matches!(
            writer.write_chunk(b"abc", &mut lock),
            Err(FileError::Overrun(_))
        ));
    }

    #[test]
    fn test_descriptor_closed_between_chunks() {
        let dir = TempDir::new().unwrap();
        let entry = entry_for("fd.bin", b"abcdef", 0);
        let (mut lock, warnings) = fixture(&dir, std::slice::from_ref(&entry));

        let mut writer = FileWriter::new(dir.path(), &entry, false, warnings);
        writer.open(None, &mut lock).unwrap();
        writer.write_chunk(b"abc", &mut lock).unwrap();

        // The descriptor is not held across chunk boundaries: the part
        // file can be removed between appends on any platform.
        std::fs::remove_file(part_path(dir.path(), "fd.bin")).unwrap();
    }
}
