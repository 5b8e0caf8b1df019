use crate::shape::Shape;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The shape tag line holds no known tag.
    #[error("unknown shape tag {tag:?} in {context}")]
    UnknownShape { tag: String, context: &'static str },

    /// A known tag that this frame kind cannot carry (`I` in a command, `H` in a result).
    #[error("shape {shape} is not allowed in {context}")]
    ShapeNotAllowed { shape: Shape, context: &'static str },

    /// A numeric value line does not parse.
    #[error("invalid {shape} value {text:?}")]
    InvalidNumber { shape: Shape, text: String },

    /// A single-line command does not have the `<action> <tag>...` layout.
    #[error("malformed command line {0:?}")]
    MalformedCommandLine(String),

    /// The action name is empty after trimming.
    #[error("action name must not be empty")]
    EmptyActionName,

    /// A field to be encoded would break the line framing.
    #[error("{field} must not contain line breaks")]
    LineBreakInField { field: &'static str },

    /// A line exceeds the configured maximum length.
    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed (end of stream).
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// "No data yet" conditions from a read with a timeout. These are not
    /// failures and should not be reported.
    pub fn is_transient(&self) -> bool {
        match self {
            FrameError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Errors caused by malformed bytes on the wire; the stream is still usable.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            FrameError::UnknownShape { .. }
                | FrameError::ShapeNotAllowed { .. }
                | FrameError::InvalidNumber { .. }
                | FrameError::MalformedCommandLine(_)
                | FrameError::LineTooLong { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
