//! Streaming byte-to-frame decoder.
//!
//! Transports deliver arbitrarily sized chunks; the parser accumulates them
//! and yields complete, checksum-verified frames. On a corrupt prefix it
//! advances one byte at a time until the next sync byte lines up, so a
//! garbled stream recovers at the following valid frame.

use tracing::debug;

use crate::protocol::frame::{self, Frame, CHECKSUM_LEN};
use crate::protocol::{ProtocolVersion, SYNC};

enum ParseError {
    IncompleteData,
    InvalidFrame,
}

type ParseResult = Result<(Frame, usize), ParseError>;

fn parse_frame(version: ProtocolVersion, input: &[u8]) -> ParseResult {
    let header = frame::header_len(version);
    if input.len() < header {
        return Err(ParseError::IncompleteData);
    }

    if input[0] != SYNC {
        return Err(ParseError::InvalidFrame);
    }

    let total = header + frame::payload_len(version, input) + CHECKSUM_LEN;
    if input.len() < total {
        return Err(ParseError::IncompleteData);
    }

    match frame::decode(version, &input[..total]) {
        Ok(frame) => Ok((frame, total)),
        Err(_) => Err(ParseError::InvalidFrame),
    }
}

pub struct FrameParser {
    version: ProtocolVersion,
    buf: Vec<u8>,
}

impl FrameParser {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            buf: Vec::new(),
        }
    }

    /// Switches the expected wire format. Pending bytes are dropped; callers
    /// only do this between request/response exchanges.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
        self.buf.clear();
    }

    /// Appends `input` and attempts to decode a frame. Returns `None` when
    /// more bytes are needed. A returned frame does not mean the internal
    /// buffer is drained; call again with an empty slice to keep draining.
    pub fn consume(&mut self, input: &[u8]) -> Option<Frame> {
        self.buf.extend_from_slice(input);
        loop {
            match parse_frame(self.version, &self.buf) {
                Ok((frame, consumed)) => {
                    self.buf.drain(0..consumed);
                    return Some(frame);
                }
                Err(ParseError::IncompleteData) => return None,
                Err(ParseError::InvalidFrame) => {
                    debug!("skipping byte while searching for frame sync");
                    if self.buf.is_empty() {
                        return None;
                    }
                    self.buf.drain(0..1);
                }
            }
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Vec<u8> {
        Frame::new(0, 10, vec![1, 2, 3, 4])
            .encode(ProtocolVersion::V0)
            .unwrap()
    }

    #[test]
    fn parses_a_whole_frame() {
        let mut parser = FrameParser::new(ProtocolVersion::V0);
        let frame = parser.consume(&sample_frame()).unwrap();
        assert_eq!(frame.function, 10);
        assert_eq!(frame.payload, vec![1, 2, 3, 4]);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn reassembles_split_chunks() {
        let bytes = sample_frame();
        let (a, b) = bytes.split_at(3);

        let mut parser = FrameParser::new(ProtocolVersion::V0);
        assert!(parser.consume(a).is_none());
        let frame = parser.consume(b).unwrap();
        assert_eq!(frame.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn resynchronizes_after_garbage_prefix() {
        let mut stream = vec![0xDE, 0xAD, 0xBE];
        stream.extend_from_slice(&sample_frame());

        let mut parser = FrameParser::new(ProtocolVersion::V0);
        let frame = parser.consume(&stream).unwrap();
        assert_eq!(frame.function, 10);
        assert_eq!(frame.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn drains_back_to_back_frames() {
        let mut stream = sample_frame();
        stream.extend_from_slice(
            &Frame::new(0, 11, vec![9])
                .encode(ProtocolVersion::V0)
                .unwrap(),
        );

        let mut parser = FrameParser::new(ProtocolVersion::V0);
        let first = parser.consume(&stream).unwrap();
        assert_eq!(first.function, 10);
        let second = parser.consume(&[]).unwrap();
        assert_eq!(second.function, 11);
        assert_eq!(second.payload, vec![9]);
        assert!(parser.consume(&[]).is_none());
    }

    #[test]
    fn corrupt_checksum_frame_is_skipped_then_next_recovered() {
        let mut bad = sample_frame();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        bad.extend_from_slice(&sample_frame());

        let mut parser = FrameParser::new(ProtocolVersion::V0);
        let frame = parser.consume(&bad).unwrap();
        assert_eq!(frame.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn v1_frames_parse_with_component_routing() {
        let bytes = Frame::new(2, 70, vec![5, 5])
            .encode(ProtocolVersion::V1)
            .unwrap();
        let mut parser = FrameParser::new(ProtocolVersion::V1);
        let frame = parser.consume(&bytes).unwrap();
        assert_eq!(frame.component, 2);
        assert_eq!(frame.function, 70);
    }
}
