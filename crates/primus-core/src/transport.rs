//! Frame transport: typed, length-delimited frames over a byte stream.
//!
//! ```text
//! [i32 BE: type tag][u64 BE: len][payload bytes of len]
//! ```
//!
//! The decoder is incremental. Bytes are pushed as they arrive and a frame is
//! only produced once its tag, length and full payload have been consumed, so
//! a partial frame never surfaces early and several frames delivered in one
//! read all come out of a single `decode` call.

use crate::{PrimusError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the `[tag][len]` header.
pub const HEADER_LEN: usize = 4 + 8;

/// Upper bound on the payload space reserved up front for one frame.
const MAX_RESERVE: usize = 64 * 1024;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: i32,
    pub payload: Bytes,
}

/// Encode a frame ready to be written to a socket.
pub fn encode_frame(tag: i32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_i32(tag);
    buf.put_u64(payload.len() as u64);
    buf.put_slice(payload);
    buf.freeze()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for the 4-byte type tag.
    Tag,
    /// Tag read, waiting for the 8-byte length.
    Length { tag: i32 },
    /// Header read, accumulating `len` payload bytes.
    Payload { tag: i32, len: usize },
}

/// Incremental frame decoder holding the receive-side state of one stream.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    max_payload: Option<u64>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Decoder with no payload size limit.
    pub fn new() -> Self {
        Self {
            state: DecodeState::Tag,
            max_payload: None,
        }
    }

    /// Decoder that rejects frames whose declared length exceeds `max`.
    pub fn with_max_payload(max: u64) -> Self {
        Self {
            state: DecodeState::Tag,
            max_payload: Some(max),
        }
    }

    /// True when no partial frame is pending.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::Tag
    }

    /// Consume as much of `buf` as possible and return every completed frame.
    ///
    /// Bytes belonging to an incomplete frame are left in `buf` (payload) or
    /// recorded in the decoder (tag and length), ready for the next call.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();

        loop {
            match self.state {
                DecodeState::Tag => {
                    if buf.len() < 4 {
                        break;
                    }
                    let tag = buf.get_i32();
                    self.state = DecodeState::Length { tag };
                }
                DecodeState::Length { tag } => {
                    if buf.len() < 8 {
                        break;
                    }
                    let len = buf.get_u64();
                    if let Some(max) = self.max_payload {
                        if len > max {
                            self.state = DecodeState::Tag;
                            return Err(PrimusError::FrameTooLarge { len, max });
                        }
                    }
                    let len = usize::try_from(len)
                        .map_err(|_| PrimusError::FrameTooLarge {
                            len,
                            max: usize::MAX as u64,
                        })?;
                    // The declared length is untrusted; the buffer grows as
                    // payload bytes actually arrive.
                    buf.reserve(len.min(MAX_RESERVE));
                    self.state = DecodeState::Payload { tag, len };
                }
                DecodeState::Payload { tag, len } => {
                    if buf.len() < len {
                        break;
                    }
                    let payload = buf.split_to(len).freeze();
                    frames.push(Frame { tag, payload });
                    self.state = DecodeState::Tag;
                }
            }
        }

        Ok(frames)
    }
}
