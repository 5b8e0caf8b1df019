use std::time::Duration;

use serialrpc_frame::{FrameError, Shape};
use serialrpc_transport::TransportError;

/// Boxed error returned by action handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in connection and call operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Opening or using the serial port failed.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// Bytes on the wire, or a value to be sent, do not fit the frame format.
    #[error("protocol error: {0}")]
    Decode(#[from] FrameError),

    /// No action is registered under this exact name and argument shape.
    #[error("no action {action:?} taking {shape} arguments")]
    ActionNotFound { action: String, shape: Shape },

    /// A registered action failed or panicked while handling a peer call.
    #[error("action {action:?} failed: {source}")]
    ActionExecution {
        action: String,
        #[source]
        source: BoxError,
    },

    /// The peer executed the call and reported a failure.
    #[error("remote action {action:?} failed: {message}")]
    RemoteExecution { action: String, message: String },

    /// A call was made while the connection is not open.
    #[error("not connected")]
    NotConnected,

    /// `attach` was called on a connection that already has a live link.
    #[error("already connected to {0}")]
    AlreadyConnected(String),

    /// The call could not be sent.
    #[error("call {action:?} could not be sent: {source}")]
    ActionFailed {
        action: String,
        #[source]
        source: FrameError,
    },

    /// No reply arrived within the configured call timeout.
    #[error("call {action:?} timed out after {after:?}")]
    Timeout { action: String, after: Duration },

    /// The link went away while a call was waiting for its reply.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// The reply carried a value of a different shape than the call expects.
    #[error("call {action:?} expected a {expected} result, got {actual}")]
    UnexpectedResult {
        action: String,
        expected: Shape,
        actual: Shape,
    },

    /// A result or error frame arrived while no call was waiting.
    #[error("unsolicited {0} with no call in flight")]
    UnsolicitedReply(String),

    /// The blocking task running a call did not complete.
    #[cfg(feature = "async")]
    #[error("call task failed: {0}")]
    Task(String),
}

impl PeerError {
    /// Communication failures of a call: nothing was learned about whether
    /// the peer executed it.
    pub fn is_action_failed(&self) -> bool {
        matches!(
            self,
            PeerError::NotConnected
                | PeerError::ActionFailed { .. }
                | PeerError::Timeout { .. }
                | PeerError::Disconnected(_)
                | PeerError::UnexpectedResult { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_failed_family() {
        assert!(PeerError::NotConnected.is_action_failed());
        assert!(PeerError::Disconnected("eof".into()).is_action_failed());
        assert!(!PeerError::RemoteExecution {
            action: "Boom".into(),
            message: "bad state".into(),
        }
        .is_action_failed());
        assert!(!PeerError::UnsolicitedReply("result".into()).is_action_failed());
    }

    #[test]
    fn remote_execution_message_is_visible() {
        let err = PeerError::RemoteExecution {
            action: "Boom".into(),
            message: "bad state".into(),
        };
        assert_eq!(err.to_string(), "remote action \"Boom\" failed: bad state");
    }
}
