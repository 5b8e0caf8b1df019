use std::fmt;
use std::io;

use serialrpc_frame::FrameError;
use serialrpc_peer::PeerError;
use serialrpc_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
/// The board executed the call and reported a failure.
pub const REMOTE_ERROR: i32 = 4;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let hint = if err.is_retryable() {
        " (retry with another baud rate or once the port is free)"
    } else {
        ""
    };
    match err {
        TransportError::PortUnavailable { source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {source}"))
        }
        other @ TransportError::UnsupportedBaudRate { .. } => {
            CliError::new(USAGE, format!("{context}: {other}{hint}"))
        }
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}{hint}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        other @ FrameError::ConnectionClosed => {
            CliError::new(FAILURE, format!("{context}: {other}"))
        }
        other @ (FrameError::EmptyActionName | FrameError::LineBreakInField { .. }) => {
            CliError::usage(format!("{context}: {other}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Connection(err) => transport_error(context, err),
        PeerError::Decode(err) => frame_error(context, err),
        other @ PeerError::RemoteExecution { .. } => {
            CliError::new(REMOTE_ERROR, format!("{context}: {other}"))
        }
        other @ PeerError::Timeout { .. } => {
            CliError::new(TIMEOUT, format!("{context}: {other}"))
        }
        other @ PeerError::ActionFailed { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {other}"))
        }
        other @ PeerError::UnexpectedResult { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {other}"))
        }
        other @ (PeerError::NotConnected | PeerError::Disconnected(_)) => {
            CliError::new(FAILURE, format!("{context}: {other}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
