//! # Chat Relay Codec - Integrity and Framing Rules
//!
//! ## Purpose
//!
//! This crate contains the "Rules" layer of the chat relay: everything both
//! peers must compute identically, with no networking.
//! - CRC-32C checksum computation and bit-string field verification
//! - Two-dimensional parity blocks (row/column XOR parity)
//! - Frame grammar (`MESG|`, `CONN|`, `GONE|`, `LIST|`, `MERR`)
//! - Streaming newline codec for tokio framed readers and writers
//!
//! ## Architecture Role
//!
//! ```text
//! inbound bytes → FrameCodec → Frame → checksum::check → ParityBlock::verify
//!                                                              ↓
//! outbound bytes ← SealedMessage::to_bytes ←───────────── relay broadcast
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Socket management or connection handling (see `relay-core`)
//! - Client registry or broadcast policy

pub mod checksum;
pub mod codec;
pub mod constants;
pub mod error;
pub mod frame;
pub mod parity;

pub use checksum::{check, compute_checksum, encode_checksum_field, parse_checksum_field, verify};
pub use codec::FrameCodec;
pub use constants::*;
pub use error::{CodecError, ProtocolError, ProtocolResult, RejectionKind};
pub use frame::{clean_name, Frame, SealedMessage};
pub use parity::{GridShape, ParityBlock, ParityGrid};
