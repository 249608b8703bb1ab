//! Streaming line codec for chat frames.
//!
//! Lines are accumulated in the framed reader's persistent buffer, so partial
//! reads and several lines per read are both handled. Recoverable problems
//! (over-long lines, invalid UTF-8) are yielded as `Err` items rather than
//! decoder errors: the stream stays alive and the next line decodes normally.

use std::cmp;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::constants::{DEFAULT_MAX_LINE_LENGTH, LINE_TERMINATOR};
use crate::error::{CodecError, ProtocolError, ProtocolResult};
use crate::frame::{clean_line, Frame};

/// Tokio codec for newline-delimited chat frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_line_length: usize,
    /// Bytes already scanned for a terminator
    next_index: usize,
    /// Dropping the remainder of an over-long line
    discarding: bool,
}

impl FrameCodec {
    /// Create a codec with the default line limit
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom line limit
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Whether `frame` fits on one line under this codec's limit
    ///
    /// The encoder runs the same check; callers writing several frames as a
    /// unit use it to refuse the unit before any frame is buffered.
    pub fn check_frame(&self, frame: &Frame) -> ProtocolResult<()> {
        let body = match frame {
            Frame::Checksum(body)
            | Frame::Message(body)
            | Frame::Joined(body)
            | Frame::Left(body)
            | Frame::Roster(body) => body.as_str(),
            Frame::Rejected => "",
        };

        if body.bytes().any(|b| b == LINE_TERMINATOR) {
            return Err(ProtocolError::unexpected_frame(
                frame.tag(),
                "body contains a line terminator",
            ));
        }

        if body.len() + 5 > self.max_line_length {
            return Err(ProtocolError::LineTooLong {
                limit: self.max_line_length,
            });
        }

        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(raw: &[u8]) -> ProtocolResult<String> {
    match std::str::from_utf8(raw) {
        Ok(line) => Ok(clean_line(line).to_string()),
        Err(e) => Err(ProtocolError::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        }),
    }
}

impl Decoder for FrameCodec {
    type Item = ProtocolResult<String>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = cmp::min(self.max_line_length.saturating_add(1), src.len());
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == LINE_TERMINATOR);

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    // End of the over-long line: resume with the next one
                    src.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let newline_index = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(newline_index + 1);
                    return Ok(Some(decode_line(&line[..newline_index])));
                }
                (false, None) if src.len() > self.max_line_length => {
                    debug!(
                        "Discarding line longer than {} bytes",
                        self.max_line_length
                    );
                    self.discarding = true;
                    return Ok(Some(Err(ProtocolError::LineTooLong {
                        limit: self.max_line_length,
                    })));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        // Trailing line without terminator
        self.next_index = 0;
        if self.discarding || src.iter().all(|b| *b == b'\r' || *b == 0) {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }

        let line = src.split_to(src.len());
        Ok(Some(decode_line(&line)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.check_frame(&frame)?;
        frame.encode_into(dst);
        Ok(())
    }
}
