//! `tokio_util` codec over the same incremental decoder the blocking reader uses.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{
    decode_frame, encode_command, encode_frame, Command, Decoded, Frame, DEFAULT_MAX_LINE_LEN,
};
use crate::error::{FrameError, Result};

/// Line-frame codec for `FramedRead` / `FramedWrite`.
///
/// Decodes inbound preamble frames. Encodes host call lines from a
/// [`Command`] and device-side frames from a [`Frame`].
#[derive(Debug, Clone)]
pub struct LineFrameCodec {
    max_line_len: usize,
}

impl LineFrameCodec {
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self { max_line_len }
    }
}

impl Default for LineFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineFrameCodec {
    type Item = Decoded;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>> {
        decode_frame(src, self.max_line_len)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>> {
        match self.decode(src)? {
            Some(decoded) => Ok(Some(decoded)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Command> for LineFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<()> {
        encode_command(&item.action, &item.args, dst)
    }
}

impl Encoder<Frame> for LineFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, dst)
    }
}
