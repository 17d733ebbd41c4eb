//! # Ferry Core
//!
//! Core protocol implementation for ferry.
//!
//! This crate provides:
//! - **Frame codec**: length-prefixed AEAD frames with counter nonces
//! - **Wire manifest**: the batch metadata document exchanged up front
//! - **Sender engine**: listen, handshake, stream, honor retries
//! - **Receiver engine**: connect, handshake, resume planning, writers,
//!   integrity verification, retry requests
//! - **Error taxonomy**: the closed sum every operation maps into
//!
//! One TCP connection carries one session. After the raw public-key
//! exchange, everything on the wire is an independently authenticated
//! frame; see [`frame`] for the exact layout.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod manifest;
pub mod progress;
pub mod receiver;
pub mod sender;
pub mod session;

pub use error::TransferError;
pub use frame::{Frame, FrameCodec};
pub use manifest::Manifest;
pub use progress::{NullProgress, ProgressSink};
pub use receiver::{run_receiver, ReceiverConfig};
pub use sender::{Sender, SenderConfig};
pub use session::{ConnectionString, TRANSFER_PORT};
