//! Line-oriented frame codec for the serialrpc wire protocol.
//!
//! Every inbound frame is a run of newline-terminated ASCII lines:
//! - A preamble line selecting the kind (`MArC_cmd`, `MArC_res`, `MArC_err`, `MArC_msg`)
//! - A shape tag line (`V`, `I`, `H`, `S`, `F`) where the kind carries values
//! - Zero to two value lines in decimal text
//!
//! Outbound calls use a single line: `<action> <tag><value>[,<value>]`.
//! The decoder is incremental: callers feed bytes as they arrive and get
//! complete frames back. Non-preamble noise between frames is surfaced as a
//! fragment, never as an error.

pub mod codec;
pub mod error;
pub mod reader;
pub mod shape;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_command_line, decode_frame, decode_preamble, encode_command, encode_frame, Command,
    Decoded, Frame, FrameConfig, FrameKind, LineCursor, RemoteError, DEFAULT_MAX_LINE_LEN,
    PREAMBLE_COMMAND, PREAMBLE_ERROR, PREAMBLE_NOTICE, PREAMBLE_RESULT,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use shape::{Args, Shape, Value};
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::LineFrameCodec;
