//! Outbound side of a connection: a bounded frame queue and its writer task
//!
//! Every registered peer is reached through a [`PeerHandle`]. Enqueueing is
//! non-blocking; a peer whose queue is full is evicted by cancelling its
//! session token, so one stalled reader never holds up delivery to others.

use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::common::error::RelayEngineError;
use crate::types::ConnectionId;

/// Result of handing one frame to a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue was full; the peer has been told to shut down
    Evicted,
    /// Writer already gone
    Closed,
}

/// Sending half of a peer's outbound queue
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
}

impl PeerHandle {
    /// Create a handle and the receiver its writer task drains
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx, shutdown }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting
    pub fn try_deliver(&self, frame: Bytes) -> Delivery {
        if self.shutdown.is_cancelled() {
            return Delivery::Closed;
        }

        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "🐌 Connection {} outbound queue full ({} frames), evicting",
                    self.id,
                    self.tx.max_capacity()
                );
                self.shutdown.cancel();
                Delivery::Evicted
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

}

/// Drain a peer's queue into its socket
///
/// `preamble` is written before anything from the queue; sessions use it for
/// the roster so that no relayed frame can overtake it. Ends when every sender
/// is dropped or the token is cancelled. A write that exceeds `send_timeout`
/// cancels the token and reports an eviction.
pub async fn run_writer<W>(
    id: ConnectionId,
    mut writer: W,
    mut rx: mpsc::Receiver<Bytes>,
    preamble: Bytes,
    send_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<u64, RelayEngineError>
where
    W: AsyncWrite + Unpin,
{
    let mut write_count = 0u64;

    if !preamble.is_empty() {
        write_frame(id, &mut writer, &preamble, send_timeout, &shutdown).await?;
    }

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        write_frame(id, &mut writer, &frame, send_timeout, &shutdown).await?;
        write_count += 1;
    }

    // Best effort; the peer may already be gone
    let _ = tokio::time::timeout(send_timeout, writer.shutdown()).await;

    debug!(
        "📥 Connection {} write task ended after {} frames",
        id, write_count
    );
    Ok(write_count)
}

async fn write_frame<W>(
    id: ConnectionId,
    writer: &mut W,
    frame: &[u8],
    send_timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<(), RelayEngineError>
where
    W: AsyncWrite + Unpin,
{
    let written = tokio::select! {
        biased;
        // Abandon a blocked write; the caller stops on its next turn
        _ = shutdown.cancelled() => return Ok(()),
        written = tokio::time::timeout(send_timeout, writer.write_all(frame)) => written,
    };

    match written {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!("Failed to write to connection {}: {}", id, e);
            shutdown.cancel();
            Err(RelayEngineError::Transport(e))
        }
        Err(_) => {
            warn!(
                "⏱️ Connection {} write exceeded {:?}, evicting",
                id, send_timeout
            );
            shutdown.cancel();
            Err(RelayEngineError::Evicted {
                id,
                reason: format!("write exceeded {:?}", send_timeout),
            })
        }
    }
}
