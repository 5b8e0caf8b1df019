use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::shape::{Args, Shape, Value};

/// Preamble of a command sent by the peer.
pub const PREAMBLE_COMMAND: &str = "MArC_cmd";
/// Preamble of a call result.
pub const PREAMBLE_RESULT: &str = "MArC_res";
/// Preamble of a failed call.
pub const PREAMBLE_ERROR: &str = "MArC_err";
/// Preamble of a free-text notice.
pub const PREAMBLE_NOTICE: &str = "MArC_msg";

/// Default maximum line length: 1 KiB.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Kind of a frame, selected by its preamble line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Command,
    Result,
    Error,
    Notice,
}

impl FrameKind {
    pub fn preamble(self) -> &'static str {
        match self {
            FrameKind::Command => PREAMBLE_COMMAND,
            FrameKind::Result => PREAMBLE_RESULT,
            FrameKind::Error => PREAMBLE_ERROR,
            FrameKind::Notice => PREAMBLE_NOTICE,
        }
    }
}

/// A named call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub action: String,
    pub args: Args,
}

impl Command {
    pub fn new(action: impl Into<String>, args: Args) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }
}

/// Failure reported by the side that executed a call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub action: String,
    pub message: String,
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Command(Command),
    Result(Value),
    Error(RemoteError),
    Notice(String),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Command(_) => FrameKind::Command,
            Frame::Result(_) => FrameKind::Result,
            Frame::Error(_) => FrameKind::Error,
            Frame::Notice(_) => FrameKind::Notice,
        }
    }
}

/// Output of the incremental decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete frame.
    Frame(Frame),
    /// A non-empty line that is not a preamble (line noise, a partial frame
    /// from before the link was opened). Safe to log and ignore.
    Fragment(String),
}

/// Configuration for frame reading.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes. Default: 1 KiB.
    pub max_line_len: usize,
    /// Read timeout for blocking operations. `None` blocks forever.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            read_timeout: None,
        }
    }
}

/// Encode an outbound call line.
///
/// Wire format:
/// ```text
/// <action> V
/// <action> H<int>,<int>
/// <action> S<text>
/// <action> F<float>
/// ```
/// The action name is trimmed. No escaping is performed: an action name
/// containing a space cannot be told apart from its arguments by the peer.
pub fn encode_command(action: &str, args: &Args, dst: &mut BytesMut) -> Result<()> {
    let action = action.trim();
    if action.is_empty() {
        return Err(FrameError::EmptyActionName);
    }
    check_line(action, "action name")?;

    let line = match args {
        Args::Void => format!("{action} {}", Shape::Void.tag()),
        Args::IntPair(a, b) => format!("{action} {}{a},{b}", Shape::IntPair.tag()),
        Args::Str(s) => {
            check_line(s, "string argument")?;
            format!("{action} {}{s}", Shape::Str.tag())
        }
        Args::Float(v) => format!("{action} {}{v}", Shape::Float.tag()),
    };

    dst.reserve(line.len() + 1);
    dst.put_slice(line.as_bytes());
    dst.put_u8(b'\n');
    Ok(())
}

/// Decode a single outbound call line (the device side of [`encode_command`]).
pub fn decode_command_line(line: &str) -> Result<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (action, rest) = line
        .split_once(' ')
        .ok_or_else(|| FrameError::MalformedCommandLine(line.to_string()))?;
    let action = action.trim();
    if action.is_empty() {
        return Err(FrameError::EmptyActionName);
    }

    let mut chars = rest.chars();
    let tag = chars
        .next()
        .ok_or_else(|| FrameError::MalformedCommandLine(line.to_string()))?;
    let payload = chars.as_str();
    let shape = parse_tag(tag, "command")?;

    let args = match shape {
        Shape::Void => Args::Void,
        Shape::IntPair => {
            let (a, b) = payload.split_once(',').ok_or_else(|| FrameError::InvalidNumber {
                shape,
                text: payload.to_string(),
            })?;
            Args::IntPair(parse_int(a, shape)?, parse_int(b, shape)?)
        }
        Shape::Str => Args::Str(payload.to_string()),
        Shape::Float => Args::Float(parse_float(payload)?),
        Shape::Int => {
            return Err(FrameError::ShapeNotAllowed {
                shape,
                context: "command",
            })
        }
    };

    Ok(Command {
        action: action.to_string(),
        args,
    })
}

/// Encode a preamble frame (the format the peer sends).
///
/// Wire format:
/// ```text
/// MArC_cmd / <action> / <tag> / [<value>] / [<value>]
/// MArC_res / <tag> / [<value>]
/// MArC_err / <failed action> / <message>
/// MArC_msg / <text>
/// ```
/// one field per `\n`-terminated line.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let mut lines: Vec<String> = vec![frame.kind().preamble().to_string()];

    match frame {
        Frame::Command(command) => {
            check_line(&command.action, "action name")?;
            lines.push(command.action.clone());
            lines.push(command.args.shape().tag().to_string());
            match &command.args {
                Args::Void => {}
                Args::IntPair(a, b) => {
                    lines.push(a.to_string());
                    lines.push(b.to_string());
                }
                Args::Str(s) => {
                    check_line(s, "string argument")?;
                    lines.push(s.clone());
                }
                Args::Float(v) => lines.push(v.to_string()),
            }
        }
        Frame::Result(value) => {
            lines.push(value.shape().tag().to_string());
            match value {
                Value::Void => {}
                Value::Str(s) => {
                    check_line(s, "string value")?;
                    lines.push(s.clone());
                }
                other => lines.push(other.to_string()),
            }
        }
        Frame::Error(err) => {
            check_line(&err.action, "action name")?;
            check_line(&err.message, "error message")?;
            lines.push(err.action.clone());
            lines.push(err.message.clone());
        }
        Frame::Notice(text) => {
            check_line(text, "notice")?;
            lines.push(text.clone());
        }
    }

    for line in &lines {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
    }
    Ok(())
}

/// Classify a preamble line. `None` means the line is not a preamble.
pub fn decode_preamble(line: &str) -> Option<FrameKind> {
    match line.trim_end_matches('\r') {
        PREAMBLE_COMMAND => Some(FrameKind::Command),
        PREAMBLE_RESULT => Some(FrameKind::Result),
        PREAMBLE_ERROR => Some(FrameKind::Error),
        PREAMBLE_NOTICE => Some(FrameKind::Notice),
        _ => None,
    }
}

/// Decode the lines after a `MArC_cmd` preamble.
///
/// Returns `Ok(None)` if the lines are not all available yet.
pub fn decode_command_body(lines: &mut LineCursor<'_>) -> Result<Option<Command>> {
    let Some(action) = lines.next_line()? else {
        return Ok(None);
    };
    let Some(tag) = lines.next_line()? else {
        return Ok(None);
    };
    let shape = parse_tag_line(&tag, "command")?;

    let args = match shape {
        Shape::Void => Args::Void,
        Shape::IntPair => {
            let Some(a) = lines.next_line()? else {
                return Ok(None);
            };
            let Some(b) = lines.next_line()? else {
                return Ok(None);
            };
            Args::IntPair(parse_int(&a, shape)?, parse_int(&b, shape)?)
        }
        Shape::Str => {
            let Some(s) = lines.next_line()? else {
                return Ok(None);
            };
            Args::Str(s)
        }
        Shape::Float => {
            let Some(v) = lines.next_line()? else {
                return Ok(None);
            };
            Args::Float(parse_float(&v)?)
        }
        Shape::Int => {
            return Err(FrameError::ShapeNotAllowed {
                shape,
                context: "command",
            })
        }
    };

    Ok(Some(Command { action, args }))
}

/// Decode the lines after a `MArC_res` preamble.
pub fn decode_result_body(lines: &mut LineCursor<'_>) -> Result<Option<Value>> {
    let Some(tag) = lines.next_line()? else {
        return Ok(None);
    };
    let shape = parse_tag_line(&tag, "result")?;
    if shape == Shape::Void {
        return Ok(Some(Value::Void));
    }
    if shape == Shape::IntPair {
        return Err(FrameError::ShapeNotAllowed {
            shape,
            context: "result",
        });
    }

    let Some(line) = lines.next_line()? else {
        return Ok(None);
    };
    let value = match shape {
        Shape::Int => Value::Int(parse_int(&line, shape)?),
        Shape::Float => Value::Float(parse_float(&line)?),
        _ => Value::Str(line),
    };
    Ok(Some(value))
}

/// Decode the lines after a `MArC_err` preamble.
pub fn decode_error_body(lines: &mut LineCursor<'_>) -> Result<Option<RemoteError>> {
    let Some(action) = lines.next_line()? else {
        return Ok(None);
    };
    let Some(message) = lines.next_line()? else {
        return Ok(None);
    };
    Ok(Some(RemoteError { action, message }))
}

/// Decode the next frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet;
/// nothing is consumed in that case. Blank lines between frames are skipped.
/// On success, and on a decode error, consumes the lines read so far, so
/// the next call resumes with the following bytes.
pub fn decode_frame(src: &mut BytesMut, max_line_len: usize) -> Result<Option<Decoded>> {
    loop {
        let mut cursor = LineCursor::new(&src[..], max_line_len);
        let step = decode_step(&mut cursor);
        let consumed = cursor.consumed();

        match step {
            Ok(Step::Incomplete) => return Ok(None),
            Ok(Step::Blank) => src.advance(consumed),
            Ok(Step::Ready(decoded)) => {
                src.advance(consumed);
                return Ok(Some(decoded));
            }
            Err(err) => {
                src.advance(consumed);
                return Err(err);
            }
        }
    }
}

enum Step {
    Incomplete,
    Blank,
    Ready(Decoded),
}

fn decode_step(cursor: &mut LineCursor<'_>) -> Result<Step> {
    let Some(preamble) = cursor.next_line()? else {
        return Ok(Step::Incomplete);
    };
    if preamble.trim().is_empty() {
        return Ok(Step::Blank);
    }

    let frame = match decode_preamble(&preamble) {
        None => return Ok(Step::Ready(Decoded::Fragment(preamble))),
        Some(FrameKind::Command) => decode_command_body(cursor)?.map(Frame::Command),
        Some(FrameKind::Result) => decode_result_body(cursor)?.map(Frame::Result),
        Some(FrameKind::Error) => decode_error_body(cursor)?.map(Frame::Error),
        Some(FrameKind::Notice) => cursor.next_line()?.map(Frame::Notice),
    };

    Ok(match frame {
        Some(frame) => Step::Ready(Decoded::Frame(frame)),
        None => Step::Incomplete,
    })
}

/// Reads `\n`-terminated lines out of a byte slice without copying the
/// remainder. A trailing `\r` is stripped from each line.
pub struct LineCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    max_line_len: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(buf: &'a [u8], max_line_len: usize) -> Self {
        Self {
            buf,
            pos: 0,
            max_line_len,
        }
    }

    /// Next complete line, or `Ok(None)` if the buffer ends mid-line.
    ///
    /// An over-long line is skipped (through its terminator, or to the end
    /// of the buffer if it has none) and reported as `LineTooLong`.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let rest = &self.buf[self.pos..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(end) if end > self.max_line_len => {
                self.pos += end + 1;
                Err(FrameError::LineTooLong {
                    max: self.max_line_len,
                })
            }
            Some(end) => {
                let mut line = &rest[..end];
                if let Some(stripped) = line.strip_suffix(b"\r") {
                    line = stripped;
                }
                self.pos += end + 1;
                Ok(Some(String::from_utf8_lossy(line).into_owned()))
            }
            None if rest.len() > self.max_line_len => {
                self.pos = self.buf.len();
                Err(FrameError::LineTooLong {
                    max: self.max_line_len,
                })
            }
            None => Ok(None),
        }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }
}

fn check_line(field: &str, name: &'static str) -> Result<()> {
    if field.contains(['\n', '\r']) {
        return Err(FrameError::LineBreakInField { field: name });
    }
    Ok(())
}

fn parse_tag_line(line: &str, context: &'static str) -> Result<Shape> {
    match line.trim().chars().next() {
        Some(tag) => parse_tag(tag, context),
        None => Err(FrameError::UnknownShape {
            tag: String::new(),
            context,
        }),
    }
}

fn parse_tag(tag: char, context: &'static str) -> Result<Shape> {
    Shape::from_tag(tag).ok_or_else(|| FrameError::UnknownShape {
        tag: tag.to_string(),
        context,
    })
}

fn parse_int(text: &str, shape: Shape) -> Result<i32> {
    text.trim().parse().map_err(|_| FrameError::InvalidNumber {
        shape,
        text: text.to_string(),
    })
}

fn parse_float(text: &str) -> Result<f32> {
    text.trim().parse().map_err(|_| FrameError::InvalidNumber {
        shape: Shape::Float,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(wire: &[u8]) -> Vec<Result<Decoded>> {
        let mut buf = BytesMut::from(wire);
        let mut out = Vec::new();
        loop {
            match decode_frame(&mut buf, DEFAULT_MAX_LINE_LEN) {
                Ok(Some(decoded)) => out.push(Ok(decoded)),
                Ok(None) => break,
                Err(err) => out.push(Err(err)),
            }
        }
        out
    }

    fn frame_roundtrip(frame: Frame) {
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();
        let decoded = decode_frame(&mut buf, DEFAULT_MAX_LINE_LEN)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, Decoded::Frame(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_command_line_per_shape() {
        let cases = [
            ("Ping", Args::Void, "Ping V\n"),
            ("  Add ", Args::IntPair(2, -3), "Add H2,-3\n"),
            ("Echo", Args::Str("hi there".into()), "Echo Shi there\n"),
            ("Scale", Args::Float(0.5), "Scale F0.5\n"),
        ];
        for (action, args, expected) in cases {
            let mut buf = BytesMut::new();
            encode_command(action, &args, &mut buf).unwrap();
            assert_eq!(&buf[..], expected.as_bytes());
        }
    }

    #[test]
    fn command_line_roundtrip_every_shape() {
        for args in [
            Args::Void,
            Args::IntPair(-2147483648, 2147483647),
            Args::Str(String::new()),
            Args::Str("a,b c".into()),
            Args::Float(-12.375),
        ] {
            let mut buf = BytesMut::new();
            encode_command("Act", &args, &mut buf).unwrap();
            let line = std::str::from_utf8(&buf).unwrap();
            let command = decode_command_line(line).unwrap();
            assert_eq!(command, Command::new("Act", args));
        }
    }

    #[test]
    fn encode_command_rejects_bad_fields() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_command("   ", &Args::Void, &mut buf),
            Err(FrameError::EmptyActionName)
        ));
        assert!(matches!(
            encode_command("Echo", &Args::Str("a\nb".into()), &mut buf),
            Err(FrameError::LineBreakInField { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_command_line_rejects_malformed_input() {
        assert!(matches!(
            decode_command_line("NoSpace"),
            Err(FrameError::MalformedCommandLine(_))
        ));
        assert!(matches!(
            decode_command_line("Add H2"),
            Err(FrameError::InvalidNumber { .. })
        ));
        assert!(matches!(
            decode_command_line("Get I4"),
            Err(FrameError::ShapeNotAllowed { .. })
        ));
        assert!(matches!(
            decode_command_line("Get Q"),
            Err(FrameError::UnknownShape { .. })
        ));
    }

    #[test]
    fn preamble_frames_roundtrip() {
        frame_roundtrip(Frame::Command(Command::new("Add", Args::IntPair(-7, 12))));
        frame_roundtrip(Frame::Command(Command::new("Ping", Args::Void)));
        frame_roundtrip(Frame::Command(Command::new("Echo", Args::Str("x y".into()))));
        frame_roundtrip(Frame::Command(Command::new("Half", Args::Float(-0.125))));
        frame_roundtrip(Frame::Result(Value::Void));
        frame_roundtrip(Frame::Result(Value::Int(-42)));
        frame_roundtrip(Frame::Result(Value::Float(3.75)));
        frame_roundtrip(Frame::Result(Value::Str(String::new())));
        frame_roundtrip(Frame::Error(RemoteError {
            action: "Boom".into(),
            message: "bad state".into(),
        }));
        frame_roundtrip(Frame::Notice("booted".into()));
    }

    #[test]
    fn decode_preamble_matches_exact_tokens() {
        assert_eq!(decode_preamble("MArC_cmd"), Some(FrameKind::Command));
        assert_eq!(decode_preamble("MArC_res\r"), Some(FrameKind::Result));
        assert_eq!(decode_preamble("MArC_err"), Some(FrameKind::Error));
        assert_eq!(decode_preamble("MArC_msg"), Some(FrameKind::Notice));
        assert_eq!(decode_preamble("MArC_re"), None);
        assert_eq!(decode_preamble("GARBAGE"), None);
    }

    #[test]
    fn incomplete_frame_consumes_nothing() {
        let mut buf = BytesMut::from(&b"MArC_cmd\nAdd\nH\n2\n"[..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_LINE_LEN)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 17);

        buf.extend_from_slice(b"3\n");
        let decoded = decode_frame(&mut buf, DEFAULT_MAX_LINE_LEN)
            .unwrap()
            .unwrap();
        assert_eq!(
            decoded,
            Decoded::Frame(Frame::Command(Command::new("Add", Args::IntPair(2, 3))))
        );
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let out = decode_all(b"MArC_res\r\nI\r\n5\r\n");
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].as_ref().unwrap(),
            &Decoded::Frame(Frame::Result(Value::Int(5)))
        );
    }

    #[test]
    fn garbage_is_a_fragment_and_blank_lines_are_skipped() {
        let out = decode_all(b"GARBAGE\n\n\r\nMArC_msg\nhello\n");
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].as_ref().unwrap(),
            &Decoded::Fragment("GARBAGE".into())
        );
        assert_eq!(
            out[1].as_ref().unwrap(),
            &Decoded::Frame(Frame::Notice("hello".into()))
        );
    }

    #[test]
    fn unknown_tag_fails_and_decoding_resumes() {
        let out = decode_all(b"MArC_cmd\nAdd\nX\nMArC_res\nS\nok\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(FrameError::UnknownShape { .. })));
        assert_eq!(
            out[1].as_ref().unwrap(),
            &Decoded::Frame(Frame::Result(Value::Str("ok".into())))
        );
    }

    #[test]
    fn non_numeric_payload_consumes_whole_frame() {
        let out = decode_all(b"MArC_cmd\nAdd\nH\n2\ntwo\nMArC_msg\nnext\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(
            out[0],
            Err(FrameError::InvalidNumber {
                shape: Shape::IntPair,
                ..
            })
        ));
        assert_eq!(
            out[1].as_ref().unwrap(),
            &Decoded::Frame(Frame::Notice("next".into()))
        );
    }

    #[test]
    fn result_rejects_int_pair_tag() {
        let out = decode_all(b"MArC_res\nH\n");
        assert!(matches!(
            out[0],
            Err(FrameError::ShapeNotAllowed {
                shape: Shape::IntPair,
                ..
            })
        ));
    }

    #[test]
    fn void_result_is_explicit_marker() {
        let out = decode_all(b"MArC_res\nV\n");
        assert_eq!(
            out[0].as_ref().unwrap(),
            &Decoded::Frame(Frame::Result(Value::Void))
        );
    }

    #[test]
    fn float_parsing_is_locale_independent() {
        let out = decode_all(b"MArC_res\nF\n -2.5 \nMArC_res\nF\n2,5\n");
        assert_eq!(
            out[0].as_ref().unwrap(),
            &Decoded::Frame(Frame::Result(Value::Float(-2.5)))
        );
        assert!(matches!(out[1], Err(FrameError::InvalidNumber { .. })));
    }

    #[test]
    fn overlong_line_is_skipped() {
        let mut wire = vec![b'x'; 64];
        wire.extend_from_slice(b"\nMArC_msg\nok\n");
        let mut buf = BytesMut::from(&wire[..]);

        let err = decode_frame(&mut buf, 16).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { max: 16 }));
        let decoded = decode_frame(&mut buf, 16).unwrap().unwrap();
        assert_eq!(decoded, Decoded::Frame(Frame::Notice("ok".into())));
    }

    #[test]
    fn unterminated_overlong_input_is_discarded() {
        let mut buf = BytesMut::from(&[b'z'; 40][..]);
        let err = decode_frame(&mut buf, 16).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_frame_rejects_line_breaks() {
        let mut buf = BytesMut::new();
        let err = encode_frame(&Frame::Notice("two\nlines".into()), &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::LineBreakInField { field: "notice" }));
    }
}
