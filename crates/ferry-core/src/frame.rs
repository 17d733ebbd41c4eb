//! Frame encoding and decoding for the ferry wire protocol.
//!
//! After the public-key exchange, the stream is a sequence of
//! independently authenticated frames:
//!
//! ```text
//! u32 big-endian   ciphertext length (= plaintext length + 16)
//! 12 bytes         nonce
//! N bytes          ciphertext || tag
//! ```
//!
//! Nonces are `u32be(direction) || u64be(counter)`: direction 0 for
//! sender-to-receiver frames, 1 for control frames going back, with the
//! counter starting at 0 at key derivation and incrementing per frame in
//! that direction. Both sides compute the expected nonce independently;
//! a received nonce that differs from the expected one is a protocol
//! error, not just a failed decryption.
//!
//! Frame payloads carry a leading tag byte. All multi-byte integers in
//! payloads are big-endian.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ferry_crypto::{SessionCrypto, NONCE_SIZE, TAG_SIZE};

use crate::error::TransferError;
use crate::manifest::Manifest;

/// Maximum plaintext payload of a `FileData` frame (offset + chunk).
pub const FILE_DATA_MAX: usize = DATA_CHUNK_SIZE + 8;

/// Chunk size for file streaming (1 MiB).
pub const DATA_CHUNK_SIZE: usize = 1024 * 1024;

/// Maximum plaintext payload of a `Manifest` frame (16 MiB).
pub const MANIFEST_MAX: usize = 16 * 1024 * 1024;

/// Upper bound on the wire ciphertext length field: the largest legal
/// plaintext (tag byte + manifest cap) plus the AEAD tag.
const WIRE_FRAME_MAX: usize = 1 + MANIFEST_MAX + TAG_SIZE;

const TAG_MANIFEST: u8 = 0x01;
const TAG_FILE_DATA: u8 = 0x02;
const TAG_RETRY_REQUEST: u8 = 0x03;
const TAG_END_OF_STREAM: u8 = 0x04;
const TAG_ACK: u8 = 0x05;

/// Frame direction, the high 4 bytes of every nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Direction {
    /// Sender to receiver: manifest, file data, end-of-stream
    ToReceiver = 0,
    /// Receiver to sender: retry requests and acks
    ToSender = 1,
}

/// Deterministic per-direction nonce sequence.
#[derive(Debug)]
pub struct NonceSequence {
    direction: Direction,
    counter: u64,
}

impl NonceSequence {
    /// Start a sequence at counter zero.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            counter: 0,
        }
    }

    /// Produce the next nonce: `u32be(direction) || u64be(counter)`.
    pub fn next(&mut self) -> [u8; NONCE_SIZE] {
        let nonce = Self::nonce_at(self.direction, self.counter);
        self.counter += 1;
        nonce
    }

    /// Nonce value for a given counter, without advancing.
    #[must_use]
    pub fn nonce_at(direction: Direction, counter: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..4].copy_from_slice(&(direction as u32).to_be_bytes());
        nonce[4..].copy_from_slice(&counter.to_be_bytes());
        nonce
    }
}

/// Ack status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckStatus {
    /// Every file verified; the sender may close
    Ok = 0,
    /// Retries exhausted with failures remaining
    Failed = 1,
}

impl TryFrom<u8> for AckStatus {
    type Error = TransferError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Failed),
            other => Err(TransferError::Protocol(format!(
                "invalid ack status: 0x{other:02X}"
            ))),
        }
    }
}

/// A decoded frame payload.
#[derive(PartialEq)]
pub enum Frame {
    /// Batch metadata, first frame of every session
    Manifest(Manifest),
    /// One chunk of the concatenated file stream
    FileData {
        /// Offset of the first byte in the concatenated stream
        offset: u64,
        /// Raw chunk bytes (decompressed if the session negotiated
        /// compression)
        bytes: Vec<u8>,
    },
    /// Receiver asks for these files to be re-streamed
    RetryRequest(Vec<String>),
    /// No more file data in this pass
    EndOfStream,
    /// Terminal receiver verdict
    Ack(AckStatus),
}

impl std::fmt::Debug for Frame {
    /// Compact form: frame payloads can be a mebibyte of file data and
    /// have no business inside an error string.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Manifest(m) => write!(f, "Manifest({} entries)", m.entries.len()),
            Frame::FileData { offset, bytes } => {
                write!(f, "FileData(offset={offset}, len={})", bytes.len())
            }
            Frame::RetryRequest(paths) => write!(f, "RetryRequest({} paths)", paths.len()),
            Frame::EndOfStream => write!(f, "EndOfStream"),
            Frame::Ack(status) => write!(f, "Ack({status:?})"),
        }
    }
}

impl Frame {
    fn tag(&self) -> u8 {
        match self {
            Frame::Manifest(_) => TAG_MANIFEST,
            Frame::FileData { .. } => TAG_FILE_DATA,
            Frame::RetryRequest(_) => TAG_RETRY_REQUEST,
            Frame::EndOfStream => TAG_END_OF_STREAM,
            Frame::Ack(_) => TAG_ACK,
        }
    }
}

/// Stateful frame codec for one side of a session.
///
/// Owns both nonce sequences and the compression flag. Encode/decode is
/// strictly serialized per direction; the codec is not shared.
pub struct FrameCodec {
    tx_nonce: NonceSequence,
    rx_nonce: NonceSequence,
    compress: bool,
}

impl FrameCodec {
    /// Codec for the sender side (transmits toward the receiver).
    #[must_use]
    pub fn for_sender() -> Self {
        Self {
            tx_nonce: NonceSequence::new(Direction::ToReceiver),
            rx_nonce: NonceSequence::new(Direction::ToSender),
            compress: false,
        }
    }

    /// Codec for the receiver side.
    #[must_use]
    pub fn for_receiver() -> Self {
        Self {
            tx_nonce: NonceSequence::new(Direction::ToSender),
            rx_nonce: NonceSequence::new(Direction::ToReceiver),
            compress: false,
        }
    }

    /// Enable or disable block compression of `FileData` payloads.
    /// Negotiated once in the manifest, never per-frame.
    pub fn set_compression(&mut self, compress: bool) {
        self.compress = compress;
    }

    /// Whether compression is active.
    #[must_use]
    pub fn compression(&self) -> bool {
        self.compress
    }

    /// Encrypt and write one frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Protocol`] for an oversized payload,
    /// [`TransferError::Crypto`] on encryption failure, and
    /// [`TransferError::Network`] on socket errors.
    pub async fn write_frame<W: AsyncWrite + Unpin>(
        &mut self,
        io: &mut W,
        crypto: &SessionCrypto,
        frame: &Frame,
    ) -> Result<(), TransferError> {
        let payload = self.encode_payload(frame)?;

        let nonce = self.tx_nonce.next();
        let ciphertext = crypto.encrypt(&nonce, &payload)?;

        let len = u32::try_from(ciphertext.len())
            .map_err(|_| TransferError::Protocol("frame too large".into()))?;
        io.write_all(&len.to_be_bytes()).await?;
        io.write_all(&nonce).await?;
        io.write_all(&ciphertext).await?;
        io.flush().await?;
        Ok(())
    }

    /// Read, authenticate, and decode one frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Protocol`] for declared sizes over the
    /// cap, nonce desynchronization, unknown tags, or malformed payloads;
    /// [`TransferError::Crypto`] when the tag fails to verify; and
    /// [`TransferError::Network`] on socket errors or truncated frames.
    pub async fn read_frame<R: AsyncRead + Unpin>(
        &mut self,
        io: &mut R,
        crypto: &SessionCrypto,
    ) -> Result<Frame, TransferError> {
        let mut len_buf = [0u8; 4];
        io.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > WIRE_FRAME_MAX {
            return Err(TransferError::Protocol(format!(
                "frame declares {len} bytes, cap is {WIRE_FRAME_MAX}"
            )));
        }
        if len <= TAG_SIZE {
            return Err(TransferError::Protocol(
                "frame shorter than an AEAD tag".into(),
            ));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        io.read_exact(&mut nonce).await?;
        let expected = self.rx_nonce.next();
        if nonce != expected {
            return Err(TransferError::Protocol(
                "nonce desynchronization, possible replay or reorder".into(),
            ));
        }

        let mut ciphertext = vec![0u8; len];
        io.read_exact(&mut ciphertext).await?;

        let payload = crypto.decrypt(&nonce, &ciphertext)?;
        self.decode_payload(&payload)
    }

    fn encode_payload(&self, frame: &Frame) -> Result<Vec<u8>, TransferError> {
        let mut buf = vec![frame.tag()];
        match frame {
            Frame::Manifest(manifest) => {
                let json = serde_json::to_vec(manifest)
                    .map_err(|e| TransferError::Protocol(format!("manifest encode: {e}")))?;
                if json.len() > MANIFEST_MAX {
                    return Err(TransferError::Protocol("manifest over 16 MiB cap".into()));
                }
                buf.extend_from_slice(&json);
            }
            Frame::FileData { offset, bytes } => {
                if bytes.len() > DATA_CHUNK_SIZE {
                    return Err(TransferError::Protocol("data chunk over 1 MiB cap".into()));
                }
                buf.extend_from_slice(&offset.to_be_bytes());
                if self.compress {
                    buf.extend_from_slice(&lz4_flex::compress_prepend_size(bytes));
                } else {
                    buf.extend_from_slice(bytes);
                }
            }
            Frame::RetryRequest(paths) => {
                let count = u32::try_from(paths.len())
                    .map_err(|_| TransferError::Protocol("retry list too long".into()))?;
                buf.extend_from_slice(&count.to_be_bytes());
                for path in paths {
                    let len = u16::try_from(path.len())
                        .map_err(|_| TransferError::Protocol("retry path too long".into()))?;
                    buf.extend_from_slice(&len.to_be_bytes());
                    buf.extend_from_slice(path.as_bytes());
                }
            }
            Frame::EndOfStream => {}
            Frame::Ack(status) => buf.push(*status as u8),
        }
        Ok(buf)
    }

    fn decode_payload(&self, payload: &[u8]) -> Result<Frame, TransferError> {
        let (&tag, body) = payload
            .split_first()
            .ok_or_else(|| TransferError::Protocol("empty frame payload".into()))?;

        match tag {
            TAG_MANIFEST => {
                let manifest: Manifest = serde_json::from_slice(body)
                    .map_err(|e| TransferError::Protocol(format!("manifest decode: {e}")))?;
                Ok(Frame::Manifest(manifest))
            }
            TAG_FILE_DATA => {
                if body.len() < 8 {
                    return Err(TransferError::Protocol("truncated data frame".into()));
                }
                let offset = u64::from_be_bytes(body[..8].try_into().unwrap());
                let block = &body[8..];
                let bytes = if self.compress {
                    decompress_block(block)?
                } else {
                    if block.len() > DATA_CHUNK_SIZE {
                        return Err(TransferError::Protocol("data chunk over 1 MiB cap".into()));
                    }
                    block.to_vec()
                };
                Ok(Frame::FileData { offset, bytes })
            }
            TAG_RETRY_REQUEST => decode_retry(body),
            TAG_END_OF_STREAM => {
                if !body.is_empty() {
                    return Err(TransferError::Protocol(
                        "end-of-stream carries a payload".into(),
                    ));
                }
                Ok(Frame::EndOfStream)
            }
            TAG_ACK => {
                if body.len() != 1 {
                    return Err(TransferError::Protocol("malformed ack".into()));
                }
                Ok(Frame::Ack(AckStatus::try_from(body[0])?))
            }
            other => Err(TransferError::Protocol(format!(
                "unknown frame tag: 0x{other:02X}"
            ))),
        }
    }
}

/// Decompress an LZ4 block, rejecting declared sizes over the chunk cap
/// before allocating.
fn decompress_block(block: &[u8]) -> Result<Vec<u8>, TransferError> {
    if block.len() < 4 {
        return Err(TransferError::Protocol("truncated compressed block".into()));
    }
    let declared = u32::from_le_bytes(block[..4].try_into().unwrap()) as usize;
    if declared > DATA_CHUNK_SIZE {
        return Err(TransferError::Protocol(
            "compressed block declares over 1 MiB".into(),
        ));
    }
    lz4_flex::decompress_size_prepended(block)
        .map_err(|e| TransferError::Protocol(format!("decompression failed: {e}")))
}

fn decode_retry(body: &[u8]) -> Result<Frame, TransferError> {
    let malformed = || TransferError::Protocol("malformed retry request".into());

    if body.len() < 4 {
        return Err(malformed());
    }
    let count = u32::from_be_bytes(body[..4].try_into().unwrap()) as usize;
    let mut rest = &body[4..];
    let mut paths = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        if rest.len() < 2 {
            return Err(malformed());
        }
        let len = u16::from_be_bytes(rest[..2].try_into().unwrap()) as usize;
        rest = &rest[2..];
        if rest.len() < len {
            return Err(malformed());
        }
        let path = std::str::from_utf8(&rest[..len])
            .map_err(|_| malformed())?
            .to_string();
        rest = &rest[len..];
        paths.push(path);
    }
    if !rest.is_empty() {
        return Err(malformed());
    }
    Ok(Frame::RetryRequest(paths))
}
