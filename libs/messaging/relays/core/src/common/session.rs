//! Per-connection session: handshake, relay loop and cleanup
//!
//! ## Task Structure
//! - **Session task** (this function): reads frames, validates messages and
//!   fans them out through the registry.
//! - **Writer task**: child of the session, drains the peer's outbound queue
//!   into the socket. The session awaits it before returning.
//!
//! Both halves share one `CancellationToken`. Eviction, a failed write and
//! relay shutdown all cancel it, which ends the pending read and the writer.

use bytes::BytesMut;
use codec::{clean_name, CodecError, Frame, FrameCodec, ProtocolError, ProtocolResult};
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::common::error::RelayEngineError;
use crate::common::outbound::{run_writer, Delivery, PeerHandle};
use crate::common::registry::{deliver_all, BroadcastReport, ClientRegistry};
use crate::config::ConnectionLimits;
use crate::types::{ConnectionId, RelayStats, SessionState};
use crate::validation::MessageValidator;

/// Shared state every session needs
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<ClientRegistry>,
    pub stats: Arc<RelayStats>,
    pub validator: Arc<dyn MessageValidator>,
    pub limits: ConnectionLimits,
}

type FrameReader<S> = FramedRead<ReadHalf<S>, FrameCodec>;

/// Why the active loop stopped
#[derive(Debug)]
enum CloseReason {
    Eof,
    Cancelled,
    Transport(CodecError),
}

/// Run one connection from accept to cleanup
#[instrument(name = "session", skip_all, fields(conn = id))]
pub async fn handle_connection<S>(
    stream: S,
    id: ConnectionId,
    ctx: SessionContext,
    shutdown: CancellationToken,
) -> SessionState
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(
        read_half,
        FrameCodec::with_max_line_length(ctx.limits.max_line_length),
    );

    let handshake = tokio::time::timeout(
        ctx.limits.handshake_timeout(),
        read_name(&mut reader, &shutdown),
    )
    .await;

    let name = match handshake {
        Ok(Some(name)) => name,
        Ok(None) => {
            debug!("Connection {} closed before handshake", id);
            return transition(id, SessionState::Handshaking, SessionState::Closed);
        }
        Err(_) => {
            warn!(
                "⏱️ Connection {} sent no name within {:?}, closing",
                id,
                ctx.limits.handshake_timeout()
            );
            return transition(id, SessionState::Handshaking, SessionState::Closed);
        }
    };

    // Register and announce in one step
    let (handle, rx) = PeerHandle::channel(id, ctx.limits.outbound_queue_capacity, shutdown.clone());
    let joined = Frame::Joined(name.clone()).to_bytes();
    let admission = ctx.registry.add(id, &name, handle.clone(), &joined);
    ctx.stats.record_handshake();
    record_evictions(&ctx, admission.announced);
    let state = transition(id, SessionState::Handshaking, SessionState::Active);
    info!(
        "👋 {} joined as connection {} ({} members)",
        name,
        id,
        admission.roster.len()
    );

    let mut preamble = BytesMut::new();
    for member in &admission.roster {
        Frame::Roster(member.to_string()).encode_into(&mut preamble);
    }

    let mut writer = tokio::spawn(run_writer(
        id,
        write_half,
        rx,
        preamble.freeze(),
        ctx.limits.send_timeout(),
        shutdown.clone(),
    ));

    let reason = relay_loop(&mut reader, id, &ctx, &handle, &shutdown).await;
    match &reason {
        CloseReason::Eof => info!("🔗 Connection {} ({}) disconnected", id, name),
        CloseReason::Cancelled => info!("🔗 Connection {} ({}) cancelled", id, name),
        CloseReason::Transport(e) => warn!("Connection {} read error: {}", id, e),
    }

    // Cleanup: at most one GONE per registration
    if let Some(removal) = ctx.registry.remove(id) {
        let left = Frame::Left(removal.entry.name.to_string()).to_bytes();
        let handles: Vec<&PeerHandle> = removal.remaining.iter().map(|c| &c.handle).collect();
        record_evictions(&ctx, deliver_all(handles, &left));
    }
    // Last sender for our queue; the writer drains what is left and stops
    drop(handle);

    // Give the writer one send window to flush, then stop it
    let finished = match tokio::time::timeout(ctx.limits.send_timeout(), &mut writer).await {
        Ok(result) => result,
        Err(_) => {
            shutdown.cancel();
            writer.await
        }
    };

    match finished {
        Ok(Ok(frames)) => debug!("Connection {} flushed {} frames", id, frames),
        Ok(Err(e @ RelayEngineError::Evicted { .. })) => {
            ctx.stats.record_eviction();
            warn!("{}", e);
        }
        Ok(Err(e)) => debug!("Connection {} writer ended: {}", id, e),
        Err(e) => warn!("Connection {} writer task failed: {}", id, e),
    }

    transition(id, state, SessionState::Closed)
}

/// Read lines until a non-blank name arrives
async fn read_name<S>(reader: &mut FrameReader<S>, shutdown: &CancellationToken) -> Option<String>
where
    S: AsyncRead,
{
    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => return None,
            item = reader.next() => item?,
        };

        match item {
            Ok(Ok(line)) => {
                let name = clean_name(&line);
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
            Ok(Err(e)) => debug!("Ignoring unusable handshake line: {}", e),
            Err(e) => {
                debug!("Handshake read failed: {}", e);
                return None;
            }
        }
    }
}

async fn relay_loop<S>(
    reader: &mut FrameReader<S>,
    id: ConnectionId,
    ctx: &SessionContext,
    handle: &PeerHandle,
    shutdown: &CancellationToken,
) -> CloseReason
where
    S: AsyncRead,
{
    // Checksum line waiting for its MESG
    let mut pending: Option<String> = None;

    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => return CloseReason::Cancelled,
            item = reader.next() => item,
        };

        let frames = match item {
            None => return CloseReason::Eof,
            Some(Err(e)) => return CloseReason::Transport(e),
            Some(Ok(line)) => line.and_then(|line| Frame::parse_line(&line)),
        };

        let frames = match frames {
            Ok(frames) => frames,
            Err(e) => {
                pending = None;
                reject(id, ctx, handle, e);
                continue;
            }
        };

        for frame in frames {
            if let Err(e) = on_frame(id, ctx, frame, &mut pending) {
                reject(id, ctx, handle, e);
            }
        }
    }
}

fn on_frame(
    id: ConnectionId,
    ctx: &SessionContext,
    frame: Frame,
    pending: &mut Option<String>,
) -> ProtocolResult<()> {
    match frame {
        // Blank line
        Frame::Checksum(field) if field.trim().is_empty() => Ok(()),
        Frame::Checksum(field) => {
            if pending.replace(field).is_some() {
                debug!("Connection {} replaced an unused checksum line", id);
            }
            Ok(())
        }
        Frame::Message(text) => {
            let field = pending.take().ok_or(ProtocolError::MissingChecksum)?;
            let sealed = ctx.validator.validate(&field, &text)?;

            let report = ctx.registry.broadcast(&sealed.to_bytes(), Some(id));
            ctx.stats.record_relay(report.delivered);
            record_evictions(ctx, report);
            debug!(
                "✅ Relayed {} bytes from connection {} to {} members",
                text.len(),
                id,
                report.delivered
            );
            Ok(())
        }
        other => {
            *pending = None;
            Err(ProtocolError::unexpected_frame(
                other.tag(),
                "relay-only frame sent by a client",
            ))
        }
    }
}

fn reject(id: ConnectionId, ctx: &SessionContext, handle: &PeerHandle, error: ProtocolError) {
    warn!("❌ Connection {} message rejected: {}", id, error);
    ctx.stats.record_rejection(error.kind());

    if handle.try_deliver(Frame::Rejected.to_bytes()) == Delivery::Evicted {
        ctx.stats.record_eviction();
    }
}

fn record_evictions(ctx: &SessionContext, report: BroadcastReport) {
    if report.evicted > 0 {
        ctx.stats.record_evictions(report.evicted);
    }
}

fn transition(id: ConnectionId, from: SessionState, to: SessionState) -> SessionState {
    debug!("Connection {} {} -> {}", id, from, to);
    to
}
