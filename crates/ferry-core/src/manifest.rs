//! The wire manifest: batch metadata exchanged before any file data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ferry_files::enumerate::{assign_offsets, total_size, validate_relative_path, FileEntry};

use crate::error::TransferError;

/// Wire manifest schema version.
pub const MANIFEST_VERSION: &str = "1";

/// Batch metadata: session identity, compression flag, and the ordered
/// file entries. Encoded as UTF-8 JSON inside a `Manifest` frame; stream
/// offsets are recomputed from entry order on both sides rather than
/// carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version, currently `"1"`
    pub version: String,
    /// Random per-session identifier
    pub session_id: Uuid,
    /// Whether `FileData` payloads are block-compressed
    pub compression: bool,
    /// Files in transfer order
    pub entries: Vec<FileEntry>,
}

impl Manifest {
    /// Build a manifest over already-enumerated entries.
    #[must_use]
    pub fn new(session_id: Uuid, compression: bool, entries: Vec<FileEntry>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            session_id,
            compression,
            entries,
        }
    }

    /// Validate a received manifest and recompute stream offsets.
    ///
    /// Checks the schema version, rejects unsafe or duplicate relative
    /// paths, and assigns cumulative offsets in entry order. Runs before
    /// any disk write on the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Protocol`] for a version or uniqueness
    /// violation and [`TransferError::PathUnsafe`] for a disallowed path.
    pub fn validate(&mut self) -> Result<(), TransferError> {
        if self.version != MANIFEST_VERSION {
            return Err(TransferError::Protocol(format!(
                "unsupported manifest version: {}",
                self.version
            )));
        }

        let mut seen = std::collections::HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            validate_relative_path(&entry.path)
                .map_err(|_| TransferError::PathUnsafe(entry.path.clone()))?;
            if !seen.insert(entry.path.as_str()) {
                return Err(TransferError::Protocol(format!(
                    "duplicate manifest path: {}",
                    entry.path
                )));
            }
        }

        assign_offsets(&mut self.entries);
        Ok(())
    }

    /// Total stream length in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        total_size(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn digest(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn entry(path: &str, size: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size,
            hash: digest(path.as_bytes()),
            offset: 0,
            source: std::path::PathBuf::new(),
        }
    }

    #[test]
    fn test_wire_json_shape() {
        let manifest = Manifest::new(
            Uuid::parse_str("b4f9a7e2-1111-4222-8333-444455556666").unwrap(),
            true,
            vec![entry("a/b.txt", 1)],
        );
        let json = serde_json::to_value(&manifest).unwrap();

        assert_eq!(json["version"], "1");
        assert_eq!(json["compression"], true);
        assert_eq!(
            json["session_id"],
            "b4f9a7e2-1111-4222-8333-444455556666"
        );
        assert_eq!(json["entries"][0]["path"], "a/b.txt");
        assert_eq!(json["entries"][0]["size"], 1);
        let hash_hex = json["entries"][0]["hash_hex"].as_str().unwrap();
        assert_eq!(hash_hex.len(), 64);
        assert!(hash_hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Offsets are local bookkeeping, not wire data
        assert!(json["entries"][0].get("offset").is_none());
    }

    #[test]
    fn test_validate_recomputes_offsets() {
        let mut manifest = Manifest::new(
            Uuid::new_v4(),
            false,
            vec![entry("a", 10), entry("b", 20), entry("c", 5)],
        );
        manifest.validate().unwrap();
        let offsets: Vec<u64> = manifest.entries.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 10, 30]);
        assert_eq!(manifest.total_size(), 35);
    }

    #[test]
    fn test_validate_rejects_traversal() {
        for bad in ["../../evil", "/etc/passwd", "C:\\loot", "a/../b"] {
            let mut manifest = Manifest::new(Uuid::new_v4(), false, vec![entry(bad, 1)]);
            assert!(
                matches!(manifest.validate(), Err(TransferError::PathUnsafe(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut manifest = Manifest::new(
            Uuid::new_v4(),
            false,
            vec![entry("same", 1), entry("same", 2)],
        );
        assert!(matches!(
            manifest.validate(),
            Err(TransferError::Protocol(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_version() {
        let mut manifest = Manifest::new(Uuid::new_v4(), false, vec![]);
        manifest.version = "2".to_string();
        assert!(matches!(
            manifest.validate(),
            Err(TransferError::Protocol(_))
        ));
    }
}
