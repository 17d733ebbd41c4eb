//! Deterministic file enumeration.
//!
//! Turns a set of input paths into the ordered transfer manifest: every
//! regular file reachable from the inputs, minus exclusions, sorted by
//! relative path with cumulative stream offsets. Hashing streams each
//! file through SHA-256 once with a 1 MiB buffer.
//!
//! Relative paths are slash-separated. A bare file contributes its
//! basename; a directory contributes paths rooted at the directory's own
//! name, so the tree reappears under that name on the receiver.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::FileError;
use crate::warnlog::WarningSink;
use crate::READ_BUF_SIZE;

/// One manifest entry: a file to transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Slash-separated path relative to the receiver's destination root
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// SHA-256 of the file content
    #[serde(rename = "hash_hex", with = "crate::hex_hash")]
    pub hash: [u8; 32],
    /// Cumulative size of all preceding entries in manifest order.
    /// Recomputed locally from entry order, never sent on the wire.
    #[serde(skip)]
    pub offset: u64,
    /// Absolute source path on the sending side. Local bookkeeping,
    /// empty on the receiver.
    #[serde(skip)]
    pub source: PathBuf,
}

/// Recompute stream offsets from entry order.
pub fn assign_offsets(entries: &mut [FileEntry]) {
    let mut offset = 0u64;
    for entry in entries {
        entry.offset = offset;
        offset += entry.size;
    }
}

/// Total stream length of a manifest.
#[must_use]
pub fn total_size(entries: &[FileEntry]) -> u64 {
    entries.iter().map(|e| e.size).sum()
}

/// Validate a manifest-relative path.
///
/// Backslashes are treated as separators before validation. Rejected:
/// empty paths, absolute roots, drive letters, `.`/`..` segments, empty
/// components, and NUL bytes.
///
/// # Errors
///
/// Returns [`FileError::UnsafePath`] naming the offending path.
pub fn validate_relative_path(path: &str) -> Result<(), FileError> {
    let unsafe_path = || FileError::UnsafePath(path.to_string());

    if path.is_empty() || path.contains('\0') {
        return Err(unsafe_path());
    }

    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(unsafe_path());
    }

    // Windows drive letter (`C:...`) in any component
    let bytes = normalized.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(unsafe_path());
    }

    for component in normalized.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(unsafe_path());
        }
    }

    Ok(())
}

/// Enumerate input paths into a sorted manifest.
///
/// Special and unreadable files are skipped with a warning; duplicate
/// relative paths keep the first occurrence. Entries come back sorted
/// lexicographically with offsets assigned.
///
/// # Errors
///
/// Returns [`FileError::Pattern`] for an invalid exclusion glob and
/// [`FileError::InputNotFound`] when an input path does not resolve.
pub fn enumerate(
    inputs: &[PathBuf],
    excludes: &[String],
    warnings: &WarningSink,
) -> Result<Vec<FileEntry>, FileError> {
    let exclude_set = build_exclude_set(excludes)?;
    let mut entries: BTreeMap<String, FileEntry> = BTreeMap::new();

    for input in inputs {
        let input = input
            .canonicalize()
            .map_err(|_| FileError::InputNotFound(input.clone()))?;
        let meta = std::fs::symlink_metadata(&input)
            .map_err(|_| FileError::InputNotFound(input.clone()))?;

        if meta.is_file() {
            let rel = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| FileError::InputNotFound(input.clone()))?;
            collect_file(&input, rel, &exclude_set, &mut entries, warnings);
        } else if meta.is_dir() {
            // Root at the directory's own name: relative to its parent.
            let base = input.parent().map(Path::to_path_buf).unwrap_or_default();
            walk_directory(&input, &base, &exclude_set, &mut entries, warnings);
        } else {
            warnings.warn(&format!(
                "skipping special file: {}",
                input.display()
            ));
        }
    }

    let mut sorted: Vec<FileEntry> = entries.into_values().collect();
    assign_offsets(&mut sorted);
    Ok(sorted)
}

fn build_exclude_set(excludes: &[String]) -> Result<GlobSet, FileError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in excludes {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Match the full relative path and each component against the globs.
fn is_excluded(rel: &str, set: &GlobSet) -> bool {
    if set.is_empty() {
        return false;
    }
    set.is_match(rel) || rel.split('/').any(|component| set.is_match(component))
}

fn walk_directory(
    dir: &Path,
    base: &Path,
    excludes: &GlobSet,
    entries: &mut BTreeMap<String, FileEntry>,
    warnings: &WarningSink,
) {
    for item in WalkDir::new(dir).follow_links(false) {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                warnings.warn(&format!("skipping unreadable entry: {e}"));
                continue;
            }
        };
        if item.file_type().is_dir() {
            continue;
        }
        if !item.file_type().is_file() {
            warnings.warn(&format!(
                "skipping special file: {}",
                item.path().display()
            ));
            continue;
        }

        let rel = match relative_path(item.path(), base) {
            Some(rel) => rel,
            None => {
                warnings.warn(&format!(
                    "skipping file outside input root: {}",
                    item.path().display()
                ));
                continue;
            }
        };
        collect_file(item.path(), rel, excludes, entries, warnings);
    }
}

fn collect_file(
    path: &Path,
    rel: String,
    excludes: &GlobSet,
    entries: &mut BTreeMap<String, FileEntry>,
    warnings: &WarningSink,
) {
    if is_excluded(&rel, excludes) {
        tracing::debug!("excluded: {rel}");
        return;
    }
    if entries.contains_key(&rel) {
        warnings.warn(&format!("duplicate manifest path, keeping first: {rel}"));
        return;
    }

    match hash_file(path, warnings) {
        Ok((size, hash)) => {
            entries.insert(
                rel.clone(),
                FileEntry {
                    path: rel,
                    size,
                    hash,
                    offset: 0,
                    source: path.to_path_buf(),
                },
            );
        }
        Err(e) => {
            warnings.warn(&format!("skipping unreadable file {}: {e}", path.display()));
        }
    }
}

/// Slash-joined path of `path` relative to `base`.
fn relative_path(path: &Path, base: &Path) -> Option<String> {
    let rel = if base.as_os_str().is_empty() {
        path
    } else {
        path.strip_prefix(base).ok()?
    };

    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Stream a file through SHA-256, returning `(size, digest)`.
///
/// Size is taken from the bytes actually read. A mismatch against the
/// size reported by metadata (the file changed mid-enumeration) is
/// logged; the observed size wins.
fn hash_file(path: &Path, warnings: &WarningSink) -> std::io::Result<(u64, [u8; 32])> {
    let mut file = File::open(path)?;
    let declared = file.metadata()?.len();

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut observed = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        observed += n as u64;
    }

    if observed != declared {
        warnings.warn(&format!(
            "size of {} changed during enumeration ({declared} -> {observed})",
            path.display()
        ));
    }

    Ok((observed, hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sink(dir: &TempDir) -> WarningSink {
        WarningSink::new(dir.path())
    }

    fn sha256(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    #[test]
    fn test_validate_relative_path() {
        assert!(validate_relative_path("a/b.txt").is_ok());
        assert!(validate_relative_path("deep/ly/nested/file").is_ok());

        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path("../x").is_err());
        assert!(validate_relative_path("a/../b").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("C:\\windows\\system32").is_err());
        assert!(validate_relative_path("c:boot.ini").is_err());
        assert!(validate_relative_path("a//b").is_err());
        assert!(validate_relative_path("./a").is_err());
        assert!(validate_relative_path("a\\..\\b").is_err());
        assert!(validate_relative_path("a\0b").is_err());
    }

    #[test]
    fn test_single_file_uses_basename() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("report.pdf");
        fs::write(&file, b"contents").unwrap();

        let entries = enumerate(&[file], &[], &sink(&dir)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "report.pdf");
        assert_eq!(entries[0].size, 8);
        assert_eq!(entries[0].hash, sha256(b"contents"));
        assert_eq!(entries[0].offset, 0);
    }

    #[test]
    fn test_directory_rooted_at_own_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("photos");
        fs::create_dir_all(root.join("2024")).unwrap();
        fs::write(root.join("2024/a.jpg"), b"aaa").unwrap();
        fs::write(root.join("b.jpg"), b"bb").unwrap();

        let mut entries = enumerate(&[root], &[], &sink(&dir)).unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["photos/2024/a.jpg", "photos/b.jpg"]);
    }

    #[test]
    fn test_sorted_with_cumulative_offsets() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("data");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("zz.bin"), vec![0u8; 5]).unwrap();
        fs::write(root.join("aa.bin"), vec![0u8; 3]).unwrap();
        fs::write(root.join("mm.bin"), vec![0u8; 7]).unwrap();

        let entries = enumerate(&[root], &[], &sink(&dir)).unwrap();
        let view: Vec<(&str, u64, u64)> = entries
            .iter()
            .map(|e| (e.path.as_str(), e.size, e.offset))
            .collect();
        assert_eq!(
            view,
            vec![
                ("data/aa.bin", 3, 0),
                ("data/mm.bin", 7, 3),
                ("data/zz.bin", 5, 10),
            ]
        );
        assert_eq!(total_size(&entries), 15);
    }

    #[test]
    fn test_exclusion_globs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("main.rs"), b"fn main() {}").unwrap();
        fs::write(root.join("scratch.tmp"), b"x").unwrap();
        fs::write(root.join("target/out.bin"), b"y").unwrap();

        let entries = enumerate(
            &[root],
            &["*.tmp".to_string(), "target".to_string()],
            &sink(&dir),
        )
        .unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.rs"]);
    }

    #[test]
    fn test_exclusion_is_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("docs");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("README.md"), b"r").unwrap();

        let entries = enumerate(&[root], &["readme.md".to_string()], &sink(&dir)).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_duplicate_basenames_keep_first() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("same.txt"), b"first").unwrap();
        fs::write(b.join("same.txt"), b"second").unwrap();

        let entries = enumerate(
            &[a.join("same.txt"), b.join("same.txt")],
            &[],
            &sink(&dir),
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hash, sha256(b"first"));
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            enumerate(&[missing], &[], &sink(&dir)),
            Err(FileError::InputNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_glob_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            enumerate(&[file], &["[".to_string()], &sink(&dir)),
            Err(FileError::Pattern(_))
        ));
    }

    #[test]
    fn test_empty_file_included() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("empty.dat");
        fs::write(&file, b"").unwrap();

        let entries = enumerate(&[file], &[], &sink(&dir)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 0);
        assert_eq!(entries[0].hash, sha256(b""));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_skipped_as_special() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("real.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();

        let entries = enumerate(&[root], &[], &sink(&dir)).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["tree/real.txt"]);
    }
}
