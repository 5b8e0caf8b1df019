use std::sync::mpsc::{channel, Receiver, Sender};

use serialrpc_frame::{Command, FrameError, Value};
use serialrpc_transport::TransportError;
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};

/// A call the peer made into this side, with what the registered action
/// returned.
#[derive(Debug)]
pub struct PeerCall {
    pub command: Command,
    pub outcome: Result<Value>,
}

/// Hooks the receive thread reports through.
///
/// All methods run on the receive thread, so a slow hook delays the reply to
/// any call in flight. The defaults log through `tracing`.
pub trait EventHandler: Send + Sync {
    /// Anything that went wrong on the receive side: malformed frames,
    /// unsolicited replies, read failures, the link closing.
    fn on_error(&self, error: &PeerError) {
        warn!(error = %error, "receive error");
    }

    /// A free-text notice from the peer.
    fn on_notice(&self, message: &str) {
        info!(message, "peer notice");
    }

    /// The peer called one of our actions.
    fn on_peer_call(&self, call: &PeerCall) {
        match &call.outcome {
            Ok(value) => debug!(
                action = %call.command.action,
                args = %call.command.args,
                result = %value,
                "peer call handled"
            ),
            Err(err) => warn!(
                action = %call.command.action,
                error = %err,
                "peer call failed"
            ),
        }
    }
}

/// Logs every event; the default handler of a connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventHandler;

impl EventHandler for LogEventHandler {}

/// Receive-side event, as forwarded by [`ChannelEventHandler`].
#[derive(Debug)]
pub enum PeerEvent {
    Notice(String),
    PeerCall(PeerCall),
    Error(PeerError),
}

/// Forwards events to a channel so another thread can consume them.
///
/// Hooks only borrow their error, so forwarded errors are copies; I/O
/// sources keep their kind and message but not their OS error code.
pub struct ChannelEventHandler {
    tx: Sender<PeerEvent>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, Receiver<PeerEvent>) {
        let (tx, rx) = channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: PeerEvent) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

impl EventHandler for ChannelEventHandler {
    fn on_error(&self, error: &PeerError) {
        self.forward(PeerEvent::Error(clone_error(error)));
    }

    fn on_notice(&self, message: &str) {
        self.forward(PeerEvent::Notice(message.to_string()));
    }

    fn on_peer_call(&self, call: &PeerCall) {
        let outcome = match &call.outcome {
            Ok(value) => Ok(value.clone()),
            Err(err) => Err(clone_error(err)),
        };
        self.forward(PeerEvent::PeerCall(PeerCall {
            command: call.command.clone(),
            outcome,
        }));
    }
}

/// Copy of a borrowed error. I/O sources keep their kind and message.
fn clone_error(error: &PeerError) -> PeerError {
    match error {
        PeerError::Connection(err) => {
            PeerError::Connection(TransportError::Io(std::io::Error::other(err.to_string())))
        }
        PeerError::Decode(err) => PeerError::Decode(clone_frame_error(err)),
        PeerError::ActionNotFound { action, shape } => PeerError::ActionNotFound {
            action: action.clone(),
            shape: *shape,
        },
        PeerError::ActionExecution { action, source } => PeerError::ActionExecution {
            action: action.clone(),
            source: source.to_string().into(),
        },
        PeerError::RemoteExecution { action, message } => PeerError::RemoteExecution {
            action: action.clone(),
            message: message.clone(),
        },
        PeerError::NotConnected => PeerError::NotConnected,
        PeerError::AlreadyConnected(port) => PeerError::AlreadyConnected(port.clone()),
        PeerError::ActionFailed { action, source } => PeerError::ActionFailed {
            action: action.clone(),
            source: clone_frame_error(source),
        },
        PeerError::Timeout { action, after } => PeerError::Timeout {
            action: action.clone(),
            after: *after,
        },
        PeerError::Disconnected(reason) => PeerError::Disconnected(reason.clone()),
        PeerError::UnexpectedResult {
            action,
            expected,
            actual,
        } => PeerError::UnexpectedResult {
            action: action.clone(),
            expected: *expected,
            actual: *actual,
        },
        PeerError::UnsolicitedReply(kind) => PeerError::UnsolicitedReply(kind.clone()),
        #[cfg(feature = "async")]
        PeerError::Task(reason) => PeerError::Task(reason.clone()),
    }
}

fn clone_frame_error(error: &FrameError) -> FrameError {
    match error {
        FrameError::UnknownShape { tag, context } => FrameError::UnknownShape {
            tag: tag.clone(),
            context: *context,
        },
        FrameError::ShapeNotAllowed { shape, context } => FrameError::ShapeNotAllowed {
            shape: *shape,
            context: *context,
        },
        FrameError::InvalidNumber { shape, text } => FrameError::InvalidNumber {
            shape: *shape,
            text: text.clone(),
        },
        FrameError::MalformedCommandLine(line) => FrameError::MalformedCommandLine(line.clone()),
        FrameError::EmptyActionName => FrameError::EmptyActionName,
        FrameError::LineBreakInField { field } => FrameError::LineBreakInField { field: *field },
        FrameError::LineTooLong { max } => FrameError::LineTooLong { max: *max },
        FrameError::Io(err) => FrameError::Io(std::io::Error::new(err.kind(), err.to_string())),
        FrameError::ConnectionClosed => FrameError::ConnectionClosed,
    }
}

#[cfg(test)]
mod tests {
    use serialrpc_frame::{Args, Shape};

    use super::*;

    #[test]
    fn channel_handler_forwards_events() {
        let (handler, rx) = ChannelEventHandler::new();
        handler.on_notice("booted");
        handler.on_peer_call(&PeerCall {
            command: Command::new("Add", Args::IntPair(1, 2)),
            outcome: Ok(Value::Int(3)),
        });
        handler.on_error(&PeerError::Decode(FrameError::UnknownShape {
            tag: "X".into(),
            context: "result",
        }));

        assert!(matches!(rx.recv().unwrap(), PeerEvent::Notice(m) if m == "booted"));
        match rx.recv().unwrap() {
            PeerEvent::PeerCall(call) => {
                assert_eq!(call.command.action, "Add");
                assert_eq!(call.outcome.unwrap(), Value::Int(3));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().unwrap() {
            PeerEvent::Error(err) => assert!(err.to_string().contains("unknown shape tag")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn cloned_errors_keep_structure() {
        let err = clone_error(&PeerError::ActionNotFound {
            action: "Nope".into(),
            shape: Shape::Void,
        });
        assert!(matches!(err, PeerError::ActionNotFound { shape: Shape::Void, .. }));
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (handler, rx) = ChannelEventHandler::new();
        drop(rx);
        handler.on_notice("nobody listening");
    }
}
