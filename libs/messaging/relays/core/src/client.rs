//! # Chat Client
//!
//! Library side of the console client: performs the handshake, seals
//! outgoing text with its checksum and parity data, and verifies every
//! relayed message before handing it to a [`ChatHandler`].
//!
//! ```rust,no_run
//! use relay_core::{ChatClient, ChatHandler};
//!
//! struct Printer;
//!
//! impl ChatHandler for Printer {
//!     fn on_message_received(&self, text: &str) {
//!         println!("Received: {}", text);
//!     }
//! }
//!
//! # async fn demo() -> relay_core::Result<()> {
//! let mut client = ChatClient::connect("127.0.0.1:12345", "alice", Printer).await?;
//! client.send_user_message("hello").await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use codec::{clean_name, Frame, FrameCodec, ProtocolError, SealedMessage};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::error::{RelayEngineError, Result};
use crate::config::ClientConfig;

/// Callbacks for relay events
///
/// Called from the client's receive task, one event at a time in arrival
/// order. Only `on_message_received` is required.
pub trait ChatHandler: Send + Sync + 'static {
    /// A relayed message passed checksum and parity verification
    fn on_message_received(&self, text: &str);

    fn on_member_joined(&self, _name: &str) {}

    fn on_member_left(&self, _name: &str) {}

    /// One member already present when this client joined, itself included
    fn on_roster_entry(&self, _name: &str) {}

    /// The relay rejected the last message this client sent
    fn on_rejected(&self) {}

    /// A relayed message failed verification and was dropped
    fn on_corrupt_message(&self, _error: &ProtocolError) {}

    /// The relay closed the connection
    fn on_disconnected(&self) {}
}

/// Connected chat client
pub struct ChatClient<S = TcpStream> {
    name: String,
    writer: FramedWrite<WriteHalf<S>, FrameCodec>,
    receiver: JoinHandle<()>,
    shutdown: CancellationToken,
    disconnected: CancellationToken,
}

impl ChatClient<TcpStream> {
    /// Connect to a relay and join under `name`
    pub async fn connect<A, H>(addr: A, name: &str, handler: H) -> Result<Self>
    where
        A: ToSocketAddrs,
        H: ChatHandler,
    {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RelayEngineError::Setup(format!("Failed to connect: {}", e)))?;
        stream.set_nodelay(true)?;
        Self::handshake(stream, name, handler).await
    }

    /// Connect using [`ClientConfig`] settings
    pub async fn connect_with_config<H>(config: &ClientConfig, name: &str, handler: H) -> Result<Self>
    where
        H: ChatHandler,
    {
        let stream = TcpStream::connect(&config.server_address).await.map_err(|e| {
            RelayEngineError::Setup(format!(
                "Failed to connect to {}: {}",
                config.server_address, e
            ))
        })?;
        stream.set_nodelay(true)?;
        Self::handshake_with_limit(stream, name, handler, config.max_line_length).await
    }
}

impl<S> ChatClient<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Join over an already connected stream
    pub async fn handshake<H: ChatHandler>(stream: S, name: &str, handler: H) -> Result<Self> {
        Self::handshake_with_limit(stream, name, handler, ClientConfig::default().max_line_length)
            .await
    }

    async fn handshake_with_limit<H: ChatHandler>(
        stream: S,
        name: &str,
        handler: H,
        max_line_length: usize,
    ) -> Result<Self> {
        let name = clean_name(name);
        if name.is_empty() || name.contains('\n') {
            return Err(RelayEngineError::Setup(
                "display name must be a non-empty single line".to_string(),
            ));
        }

        let (read_half, mut write_half) = tokio::io::split(stream);
        write_half.write_all(format!("{}\n", name).as_bytes()).await?;
        write_half.flush().await?;

        let shutdown = CancellationToken::new();
        let disconnected = CancellationToken::new();
        let reader = FramedRead::new(read_half, FrameCodec::with_max_line_length(max_line_length));
        let receiver = tokio::spawn(receive_loop(
            reader,
            Arc::new(handler),
            shutdown.clone(),
            disconnected.clone(),
        ));

        info!("👋 Joined as {}", name);
        Ok(Self {
            name: name.to_string(),
            writer: FramedWrite::new(write_half, FrameCodec::with_max_line_length(max_line_length)),
            receiver,
            shutdown,
            disconnected,
        })
    }

    /// Seal and send one chat message
    ///
    /// Text that cannot travel as one frame is refused before anything is
    /// written, so the connection never carries an orphaned checksum line.
    pub async fn send_user_message(&mut self, text: &str) -> Result<()> {
        let sealed = SealedMessage::seal(text);
        let frames = sealed.frames();
        for frame in &frames {
            self.writer.encoder().check_frame(frame)?;
        }

        if let Some(block) = sealed.parity() {
            debug!("Outgoing {}", block.display(text.as_bytes()));
        }

        for frame in frames {
            self.writer.feed(frame).await?;
        }
        self.writer.flush().await?;
        debug!("Sent {} bytes as {}", text.len(), self.name);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the relay side is still open
    pub fn is_connected(&self) -> bool {
        !self.disconnected.is_cancelled()
    }

    /// Resolves once the relay closes the connection
    pub async fn disconnected(&self) {
        self.disconnected.cancelled().await
    }

    /// Close the write side and stop the receive task
    pub async fn close(mut self) -> Result<()> {
        let closed = self.writer.close().await;
        self.shutdown.cancel();

        if let Err(e) = (&mut self.receiver).await {
            warn!("Receive task failed: {}", e);
        }
        closed.map_err(RelayEngineError::from)
    }
}

async fn receive_loop<S, H>(
    mut reader: FramedRead<ReadHalf<S>, FrameCodec>,
    handler: Arc<H>,
    shutdown: CancellationToken,
    disconnected: CancellationToken,
) where
    S: AsyncRead,
    H: ChatHandler,
{
    let mut pending: Option<String> = None;

    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => break,
            item = reader.next() => item,
        };

        let frames = match item {
            None => {
                handler.on_disconnected();
                break;
            }
            Some(Err(e)) => {
                warn!("Connection to relay failed: {}", e);
                handler.on_disconnected();
                break;
            }
            Some(Ok(line)) => line.and_then(|line| Frame::parse_line(&line)),
        };

        match frames {
            Ok(frames) => {
                for frame in frames {
                    dispatch(frame, &mut pending, handler.as_ref());
                }
            }
            Err(e) => {
                pending = None;
                handler.on_corrupt_message(&e);
            }
        }
    }

    disconnected.cancel();
}

fn dispatch<H: ChatHandler>(frame: Frame, pending: &mut Option<String>, handler: &H) {
    match frame {
        Frame::Checksum(field) if field.trim().is_empty() => {}
        Frame::Checksum(field) => *pending = Some(field),
        Frame::Message(text) => {
            let verified = pending
                .take()
                .ok_or(ProtocolError::MissingChecksum)
                .and_then(|field| SealedMessage::open(&field, text))
                .and_then(|mut sealed| {
                    sealed.verify_parity()?;
                    if let Some(block) = sealed.parity() {
                        debug!("Incoming {}", block.display(sealed.text().as_bytes()));
                    }
                    Ok(sealed)
                });

            match verified {
                Ok(sealed) => handler.on_message_received(sealed.text()),
                Err(e) => {
                    warn!("Dropping corrupt message: {}", e);
                    handler.on_corrupt_message(&e);
                }
            }
        }
        Frame::Joined(name) => handler.on_member_joined(&name),
        Frame::Left(name) => handler.on_member_left(&name),
        Frame::Roster(name) => handler.on_roster_entry(&name),
        Frame::Rejected => handler.on_rejected(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{encode_checksum_field, RejectionKind};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ChatHandler for Recorder {
        fn on_message_received(&self, text: &str) {
            self.events.lock().push(format!("msg:{}", text));
        }
        fn on_member_joined(&self, name: &str) {
            self.events.lock().push(format!("join:{}", name));
        }
        fn on_rejected(&self) {
            self.events.lock().push("merr".into());
        }
        fn on_corrupt_message(&self, error: &ProtocolError) {
            self.events.lock().push(format!("corrupt:{:?}", error.kind()));
        }
    }

    #[test]
    fn test_dispatch_verifies_before_delivery() {
        let recorder = Recorder::default();
        let mut pending = None;
        let sealed = SealedMessage::seal("hello");

        dispatch(Frame::Checksum(sealed.checksum_field().into()), &mut pending, &recorder);
        dispatch(Frame::Message("hello".into()), &mut pending, &recorder);

        dispatch(Frame::Checksum(sealed.checksum_field().into()), &mut pending, &recorder);
        dispatch(Frame::Message("jello".into()), &mut pending, &recorder);

        dispatch(Frame::Message("orphan".into()), &mut pending, &recorder);
        dispatch(Frame::Joined("bob".into()), &mut pending, &recorder);
        dispatch(Frame::Rejected, &mut pending, &recorder);

        assert_eq!(
            *recorder.events.lock(),
            vec![
                "msg:hello".to_string(),
                format!("corrupt:{:?}", RejectionKind::Checksum),
                format!("corrupt:{:?}", RejectionKind::Protocol),
                "join:bob".to_string(),
                "merr".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_relayed_message_is_corrupt() {
        let recorder = Recorder::default();
        let mut pending = Some(encode_checksum_field(0));
        dispatch(Frame::Message(String::new()), &mut pending, &recorder);
        assert_eq!(
            *recorder.events.lock(),
            vec![format!("corrupt:{:?}", RejectionKind::Parity)]
        );
    }
}
