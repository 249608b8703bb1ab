//! # Chat Frame Protocol
//!
//! Every frame is one newline-terminated UTF-8 line.
//!
//! | Line                  | Direction        | Meaning                          |
//! |-----------------------|------------------|----------------------------------|
//! | `<name>`              | client → relay   | handshake, first line only       |
//! | 32 × `0`/`1`          | both             | checksum of the next `MESG` text |
//! | `MESG\|<text>`        | both             | chat message                     |
//! | `CONN\|<name>`        | relay → client   | member joined                    |
//! | `GONE\|<name>`        | relay → client   | member left                      |
//! | `LIST\|<name>`        | relay → client   | roster entry for a new member    |
//! | `MERR`                | relay → client   | last message rejected            |
//!
//! The handshake line is untagged, so it is read by the session before frame
//! parsing starts. After that, untagged lines are checksum candidates: their
//! format is only judged when the following `MESG` is verified, so a garbled
//! checksum fails closed as a checksum error.

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum;
use crate::constants::{
    CHECKSUM_BITS, LINE_TERMINATOR, TAG_JOINED, TAG_LEFT, TAG_MESSAGE, TAG_REJECTED, TAG_ROSTER,
    TAG_SEPARATOR,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::parity::ParityBlock;

/// One protocol-level unit exchanged over a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Checksum field for the next message, kept verbatim
    Checksum(String),
    /// Chat message text
    Message(String),
    /// Member joined
    Joined(String),
    /// Member left
    Left(String),
    /// Roster entry sent to a newly joined member
    Roster(String),
    /// Rejection of the last message sent
    Rejected,
}

impl Frame {
    /// Parse one decoded line (terminator already removed)
    ///
    /// A line holding a checksum immediately followed by a `MESG` frame (sent
    /// without a separating newline) yields both frames.
    pub fn parse_line(line: &str) -> ProtocolResult<Vec<Frame>> {
        let line = clean_line(line);

        if let Some(fused) = split_fused_checksum(line) {
            return Ok(fused);
        }

        Self::parse(line).map(|frame| vec![frame])
    }

    /// Parse a single frame from a cleaned line
    pub fn parse(line: &str) -> ProtocolResult<Frame> {
        let line = clean_line(line);

        if line == TAG_REJECTED {
            return Ok(Frame::Rejected);
        }

        let Some((tag, body)) = line.split_once(TAG_SEPARATOR) else {
            return Ok(Frame::Checksum(line.to_string()));
        };

        match tag {
            TAG_MESSAGE => Ok(Frame::Message(body.to_string())),
            TAG_JOINED => Ok(Frame::Joined(clean_name(body).to_string())),
            TAG_LEFT => Ok(Frame::Left(clean_name(body).to_string())),
            TAG_ROSTER => Ok(Frame::Roster(clean_name(body).to_string())),
            TAG_REJECTED => Err(ProtocolError::unexpected_frame(
                TAG_REJECTED,
                "rejection frame carries no body",
            )),
            _ => Err(ProtocolError::UnknownTag {
                tag: tag.chars().take(16).collect(),
            }),
        }
    }

    /// Tag name for logging
    pub fn tag(&self) -> &'static str {
        match self {
            Frame::Checksum(_) => "CHECKSUM",
            Frame::Message(_) => TAG_MESSAGE,
            Frame::Joined(_) => TAG_JOINED,
            Frame::Left(_) => TAG_LEFT,
            Frame::Roster(_) => TAG_ROSTER,
            Frame::Rejected => TAG_REJECTED,
        }
    }

    /// Append the wire form of this frame, terminator included
    pub fn encode_into(&self, dst: &mut BytesMut) {
        match self {
            Frame::Checksum(field) => dst.put_slice(field.as_bytes()),
            Frame::Message(text) => put_tagged(dst, TAG_MESSAGE, text),
            Frame::Joined(name) => put_tagged(dst, TAG_JOINED, name),
            Frame::Left(name) => put_tagged(dst, TAG_LEFT, name),
            Frame::Roster(name) => put_tagged(dst, TAG_ROSTER, name),
            Frame::Rejected => dst.put_slice(TAG_REJECTED.as_bytes()),
        }
        dst.put_u8(LINE_TERMINATOR);
    }

    /// Wire form of this frame as an immutable buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode_into(&mut dst);
        dst.freeze()
    }
}

/// Strip NUL residue, a trailing `\r` and the terminator from a raw line
pub fn clean_line(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r', '\0'])
        .trim_start_matches('\0')
}

/// Normalise a display name for use as a key or display value
pub fn clean_name(name: &str) -> &str {
    name.trim_matches(|c: char| c == '\0' || c.is_whitespace() || c.is_control())
}

fn put_tagged(dst: &mut BytesMut, tag: &str, body: &str) {
    dst.reserve(tag.len() + 1 + body.len() + 1);
    dst.put_slice(tag.as_bytes());
    dst.put_u8(TAG_SEPARATOR as u8);
    dst.put_slice(body.as_bytes());
}

fn split_fused_checksum(line: &str) -> Option<Vec<Frame>> {
    let head = line.get(..CHECKSUM_BITS)?;
    let rest = line.get(CHECKSUM_BITS..)?;

    if !head.bytes().all(|b| b == b'0' || b == b'1') {
        return None;
    }

    let text = rest
        .trim_start_matches('\0')
        .strip_prefix(TAG_MESSAGE)?
        .strip_prefix(TAG_SEPARATOR)?;

    Some(vec![
        Frame::Checksum(head.to_string()),
        Frame::Message(text.to_string()),
    ])
}

/// A chat message together with its integrity data
///
/// Built either by a sender ([`SealedMessage::seal`]) or by a receiver from a
/// checksum frame and a message frame ([`SealedMessage::open`]). Once opened,
/// the message is relayed byte-for-byte as it was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    checksum_field: String,
    checksum: u32,
    text: String,
    parity: Option<ParityBlock>,
}

impl SealedMessage {
    /// Compute checksum and parity for outgoing text
    pub fn seal(text: impl Into<String>) -> Self {
        let text = text.into();
        let checksum = checksum::compute_checksum(text.as_bytes());
        let parity = ParityBlock::encode(text.as_bytes());

        Self {
            checksum_field: checksum::encode_checksum_field(checksum),
            checksum,
            text,
            parity: Some(parity),
        }
    }

    /// Verify a received checksum field against received text
    ///
    /// Only the checksum is checked here; parity is checked separately so the
    /// two failures can be reported and handled under different policies.
    pub fn open(checksum_field: &str, text: impl Into<String>) -> ProtocolResult<Self> {
        let text = text.into();
        let checksum = checksum::check(text.as_bytes(), checksum_field)?;

        Ok(Self {
            checksum_field: checksum::encode_checksum_field(checksum),
            checksum,
            text,
            parity: None,
        })
    }

    /// Run the parity layer, caching the block on success
    ///
    /// A sealed message checks its text against the block computed when it
    /// was sealed. An opened message has no sender block, so the block is
    /// recomputed and only an empty text fails.
    pub fn verify_parity(&mut self) -> ProtocolResult<&ParityBlock> {
        let block = match self.parity.take() {
            Some(block) => {
                block.check(self.text.as_bytes())?;
                block
            }
            None => ParityBlock::verify(self.text.as_bytes())?,
        };
        let block = self.parity.insert(block);
        Ok(&*block)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn checksum_field(&self) -> &str {
        &self.checksum_field
    }

    pub fn parity(&self) -> Option<&ParityBlock> {
        self.parity.as_ref()
    }

    /// The two frames that carry this message
    pub fn frames(&self) -> [Frame; 2] {
        [
            Frame::Checksum(self.checksum_field.clone()),
            Frame::Message(self.text.clone()),
        ]
    }

    /// Wire form: checksum line followed by the `MESG` line
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(CHECKSUM_BITS + self.text.len() + 8);
        for frame in self.frames() {
            frame.encode_into(&mut dst);
        }
        dst.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_frames() {
        assert_eq!(
            Frame::parse("MESG|hello there").unwrap(),
            Frame::Message("hello there".into())
        );
        assert_eq!(Frame::parse("CONN|bob").unwrap(), Frame::Joined("bob".into()));
        assert_eq!(Frame::parse("GONE|bob\r").unwrap(), Frame::Left("bob".into()));
        assert_eq!(Frame::parse("LIST|alice").unwrap(), Frame::Roster("alice".into()));
        assert_eq!(Frame::parse("MERR").unwrap(), Frame::Rejected);
    }

    #[test]
    fn test_message_keeps_separators_in_text() {
        assert_eq!(
            Frame::parse("MESG|a|b|c").unwrap(),
            Frame::Message("a|b|c".into())
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            Frame::parse("PING|now"),
            Err(ProtocolError::UnknownTag { tag: "PING".into() })
        );
    }

    #[test]
    fn test_untagged_line_is_checksum_candidate() {
        assert_eq!(
            Frame::parse("garbage").unwrap(),
            Frame::Checksum("garbage".into())
        );
    }

    #[test]
    fn test_nul_residue_is_stripped() {
        assert_eq!(
            Frame::parse("CONN|carol\0\0\0").unwrap(),
            Frame::Joined("carol".into())
        );
    }

    #[test]
    fn test_fused_checksum_and_message() {
        let field = checksum::encode_checksum_field(checksum::compute_checksum(b"hi"));
        let frames = Frame::parse_line(&format!("{field}MESG|hi")).unwrap();
        assert_eq!(
            frames,
            vec![Frame::Checksum(field), Frame::Message("hi".into())]
        );
    }

    #[test]
    fn test_encode_lines() {
        assert_eq!(&Frame::Joined("bob".into()).to_bytes()[..], b"CONN|bob\n");
        assert_eq!(&Frame::Rejected.to_bytes()[..], b"MERR\n");
    }

    #[test]
    fn test_sealed_message_wire_form() {
        let sealed = SealedMessage::seal("hello");
        let wire = sealed.to_bytes();
        let text = std::str::from_utf8(&wire).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), CHECKSUM_BITS);
        assert_eq!(lines[1], "MESG|hello");
        assert!(checksum::verify(b"hello", lines[0]));
    }

    #[test]
    fn test_open_and_verify() {
        let sealed = SealedMessage::seal("hello world!");
        let mut opened = SealedMessage::open(sealed.checksum_field(), "hello world!").unwrap();

        assert!(opened.parity().is_none());
        let shape = opened.verify_parity().unwrap().shape();
        assert_eq!(shape.cell_count(), 12);
        assert_eq!(opened.to_bytes(), sealed.to_bytes());
    }

    #[test]
    fn test_open_rejects_other_payload() {
        let sealed = SealedMessage::seal("goodbye");
        assert!(matches!(
            SealedMessage::open(sealed.checksum_field(), "hello"),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_message_fails_parity() {
        let mut opened =
            SealedMessage::open(&checksum::encode_checksum_field(0), "").unwrap();
        assert_eq!(opened.verify_parity().err(), Some(ProtocolError::EmptyPayload));
    }
}
