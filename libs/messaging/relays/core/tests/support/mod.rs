//! Raw protocol peers for driving a relay over in-memory streams

#![allow(dead_code)]

use codec::{FrameCodec, SealedMessage};
use futures::StreamExt;
use relay_core::{Relay, RelayConfig};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::codec::FramedRead;

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(150);

pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config
}

/// A client speaking the wire protocol by hand
pub struct RawPeer {
    reader: FramedRead<ReadHalf<DuplexStream>, FrameCodec>,
    writer: WriteHalf<DuplexStream>,
}

impl RawPeer {
    /// Open a session without sending anything
    pub fn open(relay: &Relay, buffer: usize) -> Self {
        let (client, server) = tokio::io::duplex(buffer);
        relay.serve_connection(server);
        let (read_half, writer) = tokio::io::split(client);
        Self {
            reader: FramedRead::new(read_half, FrameCodec::new()),
            writer,
        }
    }

    /// Join and consume the roster, returning the roster names
    pub async fn join(relay: &Relay, name: &str, members_before: usize) -> (Self, Vec<String>) {
        let mut peer = Self::open(relay, 64 * 1024);
        peer.send_raw(format!("{}\n", name).as_bytes()).await;

        let mut roster = Vec::new();
        for _ in 0..=members_before {
            let line = peer.next_line().await;
            let name = line
                .strip_prefix("LIST|")
                .unwrap_or_else(|| panic!("expected roster entry, got {:?}", line));
            roster.push(name.to_string());
        }
        (peer, roster)
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Close the write side; the read side stays open
    pub async fn half_close(&mut self) {
        self.writer.shutdown().await.unwrap();
    }

    pub async fn send_message(&mut self, text: &str) {
        let wire = SealedMessage::seal(text).to_bytes();
        self.send_raw(&wire).await;
    }

    pub async fn next_line(&mut self) -> String {
        tokio::time::timeout(WAIT, self.reader.next())
            .await
            .expect("timed out waiting for a line")
            .expect("stream closed")
            .expect("transport error")
            .expect("protocol error")
    }

    /// Next relayed message text, checking its checksum line
    pub async fn next_message(&mut self) -> String {
        let checksum = self.next_line().await;
        let line = self.next_line().await;
        let text = line
            .strip_prefix("MESG|")
            .unwrap_or_else(|| panic!("expected MESG frame, got {:?}", line))
            .to_string();
        assert!(codec::verify(text.as_bytes(), &checksum), "relayed checksum mismatch");
        text
    }

    /// Nothing arrives for a short while
    pub async fn expect_quiet(&mut self) {
        if let Ok(item) = tokio::time::timeout(QUIET, self.reader.next()).await {
            panic!("expected silence, got {:?}", item);
        }
    }

    /// The relay closes this connection
    pub async fn expect_closed(&mut self) {
        let item = tokio::time::timeout(WAIT, self.reader.next())
            .await
            .expect("timed out waiting for close");
        assert!(item.is_none(), "expected EOF, got {:?}", item);
    }
}

/// Poll until `check` holds
pub async fn eventually<F: Fn() -> bool>(check: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
