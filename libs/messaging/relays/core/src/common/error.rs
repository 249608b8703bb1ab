//! # Relay Error Types
//!
//! Error categories for the chat relay engine. Rejections (checksum, parity,
//! protocol) are per-message and recoverable: the session answers `MERR` and
//! keeps reading. Transport failures and evictions end one session only.

use codec::{CodecError, ProtocolError, RejectionKind};
use thiserror::Error;

use crate::types::ConnectionId;

/// Relay engine operation errors
#[derive(Error, Debug)]
pub enum RelayEngineError {
    /// Setup and initialization errors (bind, listen)
    #[error("Setup error: {0}")]
    Setup(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Read/write/accept failures
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Detected corruption in the checksum layer
    #[error("Checksum mismatch: {0}")]
    ChecksumMismatch(ProtocolError),

    /// Detected corruption in the parity layer
    #[error("Parity mismatch: {0}")]
    ParityMismatch(ProtocolError),

    /// Malformed or out-of-place frame
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    /// Peer could not keep up and was disconnected
    #[error("Connection {id} evicted: {reason}")]
    Evicted { id: ConnectionId, reason: String },
}

impl RelayEngineError {
    /// Whether the session survives this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch(_) | Self::ParityMismatch(_) | Self::Protocol(_)
        )
    }
}

impl From<ProtocolError> for RelayEngineError {
    fn from(err: ProtocolError) -> Self {
        match err.kind() {
            RejectionKind::Checksum => Self::ChecksumMismatch(err),
            RejectionKind::Parity => Self::ParityMismatch(err),
            RejectionKind::Protocol => Self::Protocol(err),
        }
    }
}

impl From<CodecError> for RelayEngineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Protocol(e) => e.into(),
            CodecError::Io(e) => Self::Transport(e),
        }
    }
}

/// Result type alias for relay engine operations
pub type Result<T> = std::result::Result<T, RelayEngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors_classified() {
        let checksum: RelayEngineError = ProtocolError::checksum_mismatch(1, 2, 5).into();
        assert!(matches!(checksum, RelayEngineError::ChecksumMismatch(_)));

        let parity: RelayEngineError = ProtocolError::EmptyPayload.into();
        assert!(matches!(parity, RelayEngineError::ParityMismatch(_)));

        let protocol: RelayEngineError = ProtocolError::MissingChecksum.into();
        assert!(matches!(protocol, RelayEngineError::Protocol(_)));

        assert!(checksum.is_recoverable());
        assert!(parity.is_recoverable());
        assert!(protocol.is_recoverable());
    }

    #[test]
    fn test_transport_errors_are_terminal() {
        let io: RelayEngineError =
            CodecError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe")).into();
        assert!(matches!(io, RelayEngineError::Transport(_)));
        assert!(!io.is_recoverable());

        let evicted = RelayEngineError::Evicted {
            id: 7,
            reason: "outbound queue full".into(),
        };
        assert!(!evicted.is_recoverable());
        assert!(evicted.to_string().contains("Connection 7 evicted"));
    }
}
