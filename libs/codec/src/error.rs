//! Protocol-level errors for chat frame processing
//!
//! Every variant carries enough context to explain a rejection in a single
//! log line. None of them is fatal for a connection: the relay answers with
//! `MERR` and keeps reading.

use thiserror::Error;

/// Frame, checksum and parity errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Checksum field is not a 32-digit bit string
    #[error("Malformed checksum field {field:?}: {reason}")]
    MalformedChecksum { field: String, reason: String },

    /// Recomputed checksum differs from the transmitted one - data corruption
    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x} (payload: {payload_len} bytes, differing bits: {differing_bits})")]
    ChecksumMismatch {
        expected: u32,
        calculated: u32,
        payload_len: usize,
        differing_bits: u32,
    },

    /// Parity block failed its consistency check
    #[error("Parity mismatch on {rows}x{cols} grid: {detail}")]
    ParityMismatch {
        rows: usize,
        cols: usize,
        detail: String,
    },

    /// Payload has no bytes to arrange into a parity grid
    #[error("Empty payload cannot form a parity grid")]
    EmptyPayload,

    /// Tagged line with a tag this protocol does not define
    #[error("Unknown frame tag {tag:?}")]
    UnknownTag { tag: String },

    /// `MESG` frame arrived without a preceding checksum line
    #[error("Message frame without preceding checksum line")]
    MissingChecksum,

    /// Known frame in a direction or state where it is not allowed
    #[error("Unexpected {tag} frame: {context}")]
    UnexpectedFrame { tag: String, context: String },

    /// Line exceeded the configured maximum and was discarded
    #[error("Line too long: exceeds {limit} bytes, discarded up to next newline")]
    LineTooLong { limit: usize },

    /// Line bytes are not valid UTF-8
    #[error("Invalid UTF-8 in line at byte {valid_up_to}")]
    InvalidUtf8 { valid_up_to: usize },
}

/// Coarse classification used for stats and error mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    Checksum,
    Parity,
    Protocol,
}

impl ProtocolError {
    /// Create a MalformedChecksum error for a field that failed to parse
    pub fn malformed_checksum(field: &str, reason: impl Into<String>) -> Self {
        // Keep logs bounded when a peer sends garbage
        let field: String = field.chars().take(48).collect();
        Self::MalformedChecksum {
            field,
            reason: reason.into(),
        }
    }

    /// Create a ChecksumMismatch error, counting the differing bits
    pub fn checksum_mismatch(expected: u32, calculated: u32, payload_len: usize) -> Self {
        Self::ChecksumMismatch {
            expected,
            calculated,
            payload_len,
            differing_bits: (expected ^ calculated).count_ones(),
        }
    }

    /// Create a ParityMismatch error for a grid
    pub fn parity_mismatch(rows: usize, cols: usize, detail: impl Into<String>) -> Self {
        Self::ParityMismatch {
            rows,
            cols,
            detail: detail.into(),
        }
    }

    /// Create an UnexpectedFrame error
    pub fn unexpected_frame(tag: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnexpectedFrame {
            tag: tag.into(),
            context: context.into(),
        }
    }

    /// Which rejection class this error belongs to
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::MalformedChecksum { .. } | Self::ChecksumMismatch { .. } => {
                RejectionKind::Checksum
            }
            Self::ParityMismatch { .. } | Self::EmptyPayload => RejectionKind::Parity,
            _ => RejectionKind::Protocol,
        }
    }
}

/// Errors surfaced by the streaming line codec
///
/// Protocol errors are recoverable (the decoder has already resynchronised);
/// I/O errors end the stream.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Whether decoding can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
