//! # Ferry Files
//!
//! File engine for ferry.
//!
//! This crate provides the receiver-side persistence machinery and the
//! sender-side enumeration:
//! - [`enumerate`]: recursive walk, exclusion globs, streaming SHA-256
//! - [`writer`]: per-file incremental writers with bounded descriptor use
//! - [`lock`]: the durable resume-state document and its batched flushes
//! - [`fdmon`]: best-effort file-descriptor headroom checks
//! - [`warnlog`]: the append-only local warning log

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod enumerate;
pub mod error;
pub mod fdmon;
pub mod lock;
pub mod warnlog;
pub mod writer;

pub use enumerate::{enumerate, validate_relative_path, FileEntry};
pub use error::FileError;
pub use lock::{FileState, FileStatus, LockDocument, LockManager, ResumePlan};
pub use warnlog::WarningSink;
pub use writer::FileWriter;

/// Buffer size for streaming reads and rehashing (1 MiB).
pub const READ_BUF_SIZE: usize = 1024 * 1024;

pub(crate) mod hex_hash {
    //! Serde adapter: `[u8; 32]` digests as 64-char lowercase hex.

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))
    }
}

pub(crate) mod hex_hash_opt {
    //! Serde adapter: `Option<[u8; 32]>` digests as optional hex strings.

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Option<[u8; 32]>, s: S) -> Result<S::Ok, S::Error> {
        match hash {
            Some(h) => s.serialize_some(&hex::encode(h)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; 32]>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        match text {
            None => Ok(None),
            Some(t) => {
                let bytes = hex::decode(&t).map_err(serde::de::Error::custom)?;
                let arr = bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))?;
                Ok(Some(arr))
            }
        }
    }
}
