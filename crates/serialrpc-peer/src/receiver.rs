//! The receive thread: reads frames off the link and routes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serialrpc_frame::{
    Command, Decoded, Frame, FrameError, FrameReader, FrameWriter, RemoteError, Value,
};
use serialrpc_transport::SerialStream;
use tracing::{debug, trace, warn};

use crate::call::{PendingSlot, Reply};
use crate::error::PeerError;
use crate::handler::{EventHandler, PeerCall};
use crate::registry::ActionRegistry;

pub(crate) type SharedWriter = Arc<Mutex<FrameWriter<SerialStream>>>;

/// Liveness of one link, shared by the connection and its receive thread.
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    shutdown: AtomicBool,
    closed: AtomicBool,
}

impl LinkState {
    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// False once the peer closed the stream or shutdown was requested.
    pub(crate) fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.shutdown_requested()
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct ReceiveLoop {
    pub(crate) reader: FrameReader<SerialStream>,
    pub(crate) writer: SharedWriter,
    pub(crate) state: Arc<LinkState>,
    pub(crate) slot: Arc<PendingSlot>,
    pub(crate) registry: ActionRegistry,
    pub(crate) handler: Arc<dyn EventHandler>,
    pub(crate) reply_to_peer: bool,
    pub(crate) io_error_backoff: Duration,
}

impl ReceiveLoop {
    /// Read and dispatch until shutdown or end of stream.
    pub(crate) fn run(mut self) {
        let port = self.reader.get_ref().port_name().to_string();
        debug!(%port, "receive loop started");

        while !self.state.shutdown_requested() {
            match self.reader.read_frame() {
                Ok(Decoded::Frame(frame)) => self.dispatch(frame),
                Ok(Decoded::Fragment(line)) => {
                    warn!(%port, fragment = %line, "ignoring line outside any frame");
                }
                Err(err) if err.is_transient() => {}
                Err(_) if self.state.shutdown_requested() => break,
                Err(FrameError::ConnectionClosed) => {
                    self.state.mark_closed();
                    let reason = format!("{port} closed the stream");
                    if let Some(action) = self.slot.fail_pending(&reason) {
                        debug!(%port, %action, "failed pending call on end of stream");
                    }
                    self.handler.on_error(&PeerError::Disconnected(reason));
                    break;
                }
                Err(err) if err.is_malformed_input() => {
                    self.handler.on_error(&PeerError::Decode(err));
                }
                Err(err) => {
                    self.handler.on_error(&PeerError::Decode(err));
                    std::thread::sleep(self.io_error_backoff);
                }
            }
        }

        debug!(%port, "receive loop stopped");
    }

    fn dispatch(&self, frame: Frame) {
        trace!(kind = ?frame.kind(), "frame received");
        match frame {
            Frame::Command(command) => self.dispatch_command(command),
            Frame::Result(value) => self.deliver(Reply::Value(value), "result"),
            Frame::Error(err) => self.deliver(Reply::Remote(err), "error"),
            Frame::Notice(message) => self.handler.on_notice(&message),
        }
    }

    fn deliver(&self, reply: Reply, kind: &str) {
        if let Err(reply) = self.slot.deliver(reply) {
            let detail = match reply {
                Reply::Value(value) => format!("{kind} {}", describe_value(&value)),
                Reply::Remote(err) => format!("{kind} for {:?}: {}", err.action, err.message),
                Reply::Closed(reason) => format!("{kind}: {reason}"),
            };
            self.handler.on_error(&PeerError::UnsolicitedReply(detail));
        }
    }

    fn dispatch_command(&self, command: Command) {
        let outcome = self.registry.invoke(&command.action, &command.args);

        if self.reply_to_peer {
            let reply = match &outcome {
                Ok(value) => Frame::Result(value.clone()),
                Err(err) => Frame::Error(RemoteError {
                    action: command.action.clone(),
                    message: single_line(&err.to_string()),
                }),
            };
            let written = self
                .writer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .write_frame(&reply);
            if let Err(source) = written {
                self.handler.on_error(&PeerError::ActionFailed {
                    action: command.action.clone(),
                    source,
                });
            }
        }

        self.handler.on_peer_call(&PeerCall { command, outcome });
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Void => "(void)".to_string(),
        Value::Str(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
