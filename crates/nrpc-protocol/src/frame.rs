//! The three-frame wire envelope: `identity | status | payload`.
//!
//! Generalizes the grounding repo's single-frame length-prefixed codec
//! (fixed header + flag + body) to three consecutive length-prefixed
//! frames per logical message, so a duplex channel can multiplex many
//! peers behind one socket the way a ZeroMQ ROUTER socket would, without
//! pulling in an external message broker.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::identity::PeerIdentity;

/// Every message on the wire is exactly these three frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub identity: PeerIdentity,
    pub status: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(identity: PeerIdentity, status: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            identity,
            status: status.into(),
            payload: payload.into(),
        }
    }

    /// Serializes this frame as three length-prefixed segments.
    pub fn encode(&self) -> BytesMut {
        let status_bytes = self.status.as_bytes();
        let identity_bytes = self.identity.as_bytes();
        let mut buf = BytesMut::with_capacity(
            12 + identity_bytes.len() + status_bytes.len() + self.payload.len(),
        );
        buf.put_u32(identity_bytes.len() as u32);
        buf.put(identity_bytes);
        buf.put_u32(status_bytes.len() as u32);
        buf.put(status_bytes);
        buf.put_u32(self.payload.len() as u32);
        buf.put(self.payload.clone());
        buf
    }
}

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("frame length {0} exceeds the maximum allowed frame size")]
    TooLarge(u32),
    #[error("identity frame was not valid as an opaque byte string")]
    InvalidIdentity,
    #[error("status frame was not valid UTF-8: {0}")]
    InvalidStatus(#[from] std::str::Utf8Error),
}

/// Frames larger than this are rejected as a protocol violation rather than
/// allowed to exhaust memory on a malformed or hostile peer.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Accumulates bytes from a stream and decodes complete [`Frame`]s.
///
/// Mirrors the grounding repo's `Transport::decoder`: bytes are appended as
/// they arrive, and as many complete frames as possible are drained on
/// each call. Incomplete trailing bytes remain buffered for next time.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Attempts to decode the next complete frame from the buffer.
    ///
    /// Returns `Ok(None)` when the buffer doesn't yet hold a full frame.
    pub fn try_decode(&mut self) -> Result<Option<Frame>, FrameDecodeError> {
        let mut cursor = &self.buffer[..];

        let Some(identity) = read_segment(&mut cursor)? else {
            return Ok(None);
        };
        let Some(status) = read_segment(&mut cursor)? else {
            return Ok(None);
        };
        let Some(payload) = read_segment(&mut cursor)? else {
            return Ok(None);
        };

        let status = std::str::from_utf8(&status)?.to_owned();
        let consumed = self.buffer.len() - cursor.len();
        self.buffer.advance(consumed);

        Ok(Some(Frame {
            identity: PeerIdentity::from_bytes(identity),
            status,
            payload: payload.freeze(),
        }))
    }
}

/// Reads one `len:u32 | bytes` segment without consuming `cursor`'s backing
/// buffer until the whole frame is known to be complete (so a partial read
/// doesn't lose already-decoded segments of the same frame).
fn read_segment(cursor: &mut &[u8]) -> Result<Option<BytesMut>, FrameDecodeError> {
    if cursor.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge(len));
    }
    let len = len as usize;
    if cursor.len() < 4 + len {
        return Ok(None);
    }
    let segment = BytesMut::from(&cursor[4..4 + len]);
    *cursor = &cursor[4 + len..];
    Ok(Some(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let frame = Frame::new(
            PeerIdentity::from("client:1"),
            "HelloService.Hello",
            Bytes::from_static(b"{\"x\":1}"),
        );
        let encoded = frame.encode();

        let mut decoder = FrameDecoder::new();
        decoder.feed(&encoded);
        let decoded = decoder.try_decode().unwrap().expect("complete frame");
        assert_eq!(decoded, frame);
        assert!(decoder.try_decode().unwrap().is_none());
    }

    #[test]
    fn partial_feed_yields_none_until_complete() {
        let frame = Frame::new(PeerIdentity::from("a"), "s", Bytes::from_static(b"payload"));
        let encoded = frame.encode();

        let mut decoder = FrameDecoder::new();
        decoder.feed(&encoded[..encoded.len() - 2]);
        assert!(decoder.try_decode().unwrap().is_none());

        decoder.feed(&encoded[encoded.len() - 2..]);
        let decoded = decoder.try_decode().unwrap().expect("now complete");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn two_frames_back_to_back_both_decode() {
        let a = Frame::new(PeerIdentity::from("a"), "s1", Bytes::from_static(b"1"));
        let b = Frame::new(PeerIdentity::from("b"), "s2", Bytes::from_static(b"2"));
        let mut decoder = FrameDecoder::new();
        decoder.feed(&a.encode());
        decoder.feed(&b.encode());
        assert_eq!(decoder.try_decode().unwrap().unwrap(), a);
        assert_eq!(decoder.try_decode().unwrap().unwrap(), b);
        assert!(decoder.try_decode().unwrap().is_none());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_LEN + 1);
        let mut decoder = FrameDecoder::new();
        decoder.feed(&buf);
        assert!(matches!(
            decoder.try_decode(),
            Err(FrameDecodeError::TooLarge(_))
        ));
    }
}
