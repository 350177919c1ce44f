//! Length-prefixed text framing.
//!
//! Every text frame is a 4-byte big-endian payload length followed by the
//! UTF-8 payload. Raw file bytes are written without a prefix and are read
//! outside the codec (see `relay`).

use bytes::{Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Size of the length prefix on the wire.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Fatal framing failures. Either one ends the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame exceeds the {limit} byte limit")]
    Oversized { limit: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
    max_frame_length: usize,
}

impl FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        let inner = LengthDelimitedCodec::builder()
            .length_field_type::<u32>()
            .max_frame_length(max_frame_length)
            .new_codec();
        Self {
            inner,
            max_frame_length,
        }
    }

    /// Codec for the write side. Outbound frames can be longer than what a
    /// client may send (routed lines carry a timestamp and sender prefix), so
    /// only the `u32` prefix bounds them.
    pub fn outbound() -> Self {
        Self::new(u32::MAX as usize)
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        match self.inner.decode(src) {
            Ok(frame) => Ok(frame.map(|payload| String::from_utf8_lossy(&payload).into_owned())),
            // The length codec reports an over-limit prefix as InvalidData.
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(FrameError::Oversized {
                limit: self.max_frame_length,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), FrameError> {
        Ok(self.inner.encode(Bytes::from(item), dst)?)
    }
}

/// Encode a single frame into a standalone buffer (clients and tests).
pub fn encode_frame(payload: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload.as_bytes());
    out
}
