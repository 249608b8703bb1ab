//! Framed stream tests: the codec driving real async readers and writers

use codec::{Frame, FrameCodec, ProtocolError, SealedMessage};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, FramedWrite};

#[tokio::test]
async fn test_lines_split_across_writes() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader = FramedRead::new(server, FrameCodec::new());

    let sealed = SealedMessage::seal("hello there");
    let wire = sealed.to_bytes();
    let (first, second) = wire.split_at(10);

    client.write_all(b"alice\n").await.unwrap();
    client.write_all(first).await.unwrap();
    client.write_all(second).await.unwrap();
    drop(client);

    let name = reader.next().await.unwrap().unwrap().unwrap();
    assert_eq!(name, "alice");

    let checksum_line = reader.next().await.unwrap().unwrap().unwrap();
    let message_line = reader.next().await.unwrap().unwrap().unwrap();

    assert_eq!(
        Frame::parse(&checksum_line).unwrap(),
        Frame::Checksum(sealed.checksum_field().to_string())
    );
    assert_eq!(
        Frame::parse(&message_line).unwrap(),
        Frame::Message("hello there".into())
    );
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn test_stream_survives_oversized_line() {
    let (mut client, server) = tokio::io::duplex(4096);
    let mut reader = FramedRead::new(server, FrameCodec::with_max_line_length(16));

    client.write_all(&[b'x'; 100]).await.unwrap();
    client.write_all(b"\nMERR\n").await.unwrap();
    drop(client);

    assert_eq!(
        reader.next().await.unwrap().unwrap(),
        Err(ProtocolError::LineTooLong { limit: 16 })
    );
    assert_eq!(reader.next().await.unwrap().unwrap(), Ok("MERR".to_string()));
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn test_writer_emits_frames() {
    let (client, server) = tokio::io::duplex(1024);
    let mut writer = FramedWrite::new(client, FrameCodec::new());
    let mut reader = FramedRead::new(server, FrameCodec::new());

    writer.send(Frame::Joined("bob".into())).await.unwrap();
    writer.send(Frame::Rejected).await.unwrap();
    drop(writer);

    let lines: Vec<String> = reader
        .by_ref()
        .map(|item| item.unwrap().unwrap())
        .collect()
        .await;
    assert_eq!(lines, vec!["CONN|bob".to_string(), "MERR".to_string()]);
}
