use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use serialrpc_frame::{Args, FrameConfig, FrameError, FrameReader, FrameWriter, Shape, Value};
use serialrpc_transport::SerialStream;
use tracing::{debug, info, warn};

use crate::call::{AdmissionGate, PendingSlot, Reply};
use crate::config::{ConnectionConfig, PeerConfig};
use crate::error::{BoxError, PeerError, Result};
use crate::handler::{EventHandler, LogEventHandler};
use crate::receiver::{LinkState, ReceiveLoop, SharedWriter};
use crate::registry::ActionRegistry;

/// Action the peer answers with its board name.
pub const CARD_NAME_ACTION: &str = "GetCardName";

/// A synchronous RPC connection to a board on a serial port.
///
/// Calls block until the peer replies. Any number of threads may call
/// concurrently through a shared reference; they are admitted one at a time
/// in arrival order, because a reply carries nothing that ties it to its
/// call. A dedicated receive thread, started by [`connect`](Self::connect)
/// and stopped by [`disconnect`](Self::disconnect), routes replies to the
/// waiting caller and runs registered actions when the peer calls in.
pub struct Connection {
    port: String,
    baud_rate: u32,
    config: PeerConfig,
    registry: ActionRegistry,
    handler: Arc<dyn EventHandler>,
    gate: AdmissionGate,
    slot: Arc<PendingSlot>,
    link: Mutex<Option<Link>>,
}

struct Link {
    stream: SerialStream,
    writer: SharedWriter,
    state: Arc<LinkState>,
    receiver: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_config(port, baud_rate, PeerConfig::default())
    }

    pub fn with_config(port: impl Into<String>, baud_rate: u32, config: PeerConfig) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            config,
            registry: ActionRegistry::new(),
            handler: Arc::new(LogEventHandler),
            gate: AdmissionGate::default(),
            slot: Arc::new(PendingSlot::default()),
            link: Mutex::new(None),
        }
    }

    pub fn from_config(connection: &ConnectionConfig, config: PeerConfig) -> Self {
        Self::with_config(connection.port.clone(), connection.baud_rate, config)
    }

    /// Replace the event handler. Takes effect on the next connect.
    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Use an existing registry, e.g. one shared by several connections.
    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Open the serial port, wait for the board to settle, and start the
    /// receive thread. Does nothing if already connected.
    #[cfg(unix)]
    pub fn connect(&self) -> Result<()> {
        if self.is_connected() {
            debug!(port = %self.port, "already connected");
            return Ok(());
        }

        let stream = serialrpc_transport::TtyPort::open(&self.port, self.baud_rate)?;
        if !self.config.settle_delay.is_zero() {
            debug!(port = %self.port, delay = ?self.config.settle_delay, "waiting for board reset");
            std::thread::sleep(self.config.settle_delay);
        }
        self.attach(stream)
    }

    #[cfg(not(unix))]
    pub fn connect(&self) -> Result<()> {
        Err(serialrpc_transport::TransportError::PortUnavailable {
            port: self.port.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "serial ports are only supported on Unix",
            ),
        }
        .into())
    }

    /// Run the connection over an already open stream (an emulator, an
    /// in-memory pair, a port opened elsewhere). No settle delay is applied.
    pub fn attach(&self, stream: SerialStream) -> Result<()> {
        let mut link = self.lock_link();
        if let Some(existing) = link.as_ref() {
            if existing.state.is_alive() {
                return Err(PeerError::AlreadyConnected(self.port.clone()));
            }
        }
        if let Some(stale) = link.take() {
            shutdown_link(stale);
        }

        let frame_config = FrameConfig {
            read_timeout: Some(self.config.read_poll_interval),
            ..self.config.frame.clone()
        };
        let reader = FrameReader::with_config_serial(stream.try_clone()?, frame_config);
        let writer: SharedWriter = Arc::new(Mutex::new(FrameWriter::new(stream.try_clone()?)));
        let state = Arc::new(LinkState::default());

        let receive_loop = ReceiveLoop {
            reader,
            writer: Arc::clone(&writer),
            state: Arc::clone(&state),
            slot: Arc::clone(&self.slot),
            registry: self.registry.clone(),
            handler: Arc::clone(&self.handler),
            reply_to_peer: self.config.reply_to_peer,
            io_error_backoff: self.config.io_error_backoff,
        };
        let receiver = std::thread::Builder::new()
            .name(format!("serialrpc-rx {}", stream.port_name()))
            .spawn(move || receive_loop.run())
            .map_err(serialrpc_transport::TransportError::Io)?;

        info!(port = %stream.port_name(), baud_rate = stream.baud_rate(), "connected");
        *link = Some(Link {
            stream,
            writer,
            state,
            receiver: Some(receiver),
        });
        Ok(())
    }

    /// Stop the receive thread and release the port.
    ///
    /// A call still waiting for its reply fails with
    /// [`PeerError::Disconnected`]. Safe to call when not connected.
    pub fn disconnect(&self) {
        let link = self.lock_link().take();
        let Some(link) = link else {
            return;
        };
        if let Some(action) = self.slot.fail_pending("disconnected") {
            warn!(port = %self.port, %action, "disconnecting with a call in flight");
        }
        shutdown_link(link);
        info!(port = %self.port, "disconnected");
    }

    /// True while a link is attached and the peer has not closed it.
    pub fn is_connected(&self) -> bool {
        self.lock_link()
            .as_ref()
            .is_some_and(|link| link.state.is_alive())
    }

    pub fn port_name(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// The actions the peer can call.
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Register an action the peer can call; see [`ActionRegistry::register`].
    pub fn register_action<F>(&self, name: impl Into<String>, shape: Shape, handler: F)
    where
        F: Fn(&Args) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.registry.register(name, shape, handler);
    }

    /// Callers queued behind the call in flight.
    pub fn waiting_callers(&self) -> usize {
        self.gate.waiting()
    }

    /// Call `action` on the peer and wait for its reply.
    pub fn call(&self, action: &str, args: Args) -> Result<Value> {
        if !self.is_connected() {
            return Err(PeerError::NotConnected);
        }

        let _turn = self.gate.acquire();
        self.send_call(action, &args)?;
        debug!(action, args = %args, "call sent");

        match self.slot.wait(self.config.call_timeout) {
            Some(Reply::Value(value)) => {
                debug!(action, result = %value, "call returned");
                Ok(value)
            }
            Some(Reply::Remote(err)) => Err(PeerError::RemoteExecution {
                action: err.action,
                message: err.message,
            }),
            Some(Reply::Closed(reason)) => Err(PeerError::Disconnected(reason)),
            None => Err(PeerError::Timeout {
                action: action.to_string(),
                after: self.config.call_timeout.unwrap_or_default(),
            }),
        }
    }

    /// `void action()`. Any value in the reply is discarded.
    pub fn call_void(&self, action: &str) -> Result<()> {
        let value = self.call(action, Args::Void)?;
        if value != Value::Void {
            debug!(action, result = %value, "discarding value of void call");
        }
        Ok(())
    }

    /// `int action(int, int)`.
    pub fn call_int_pair(&self, action: &str, a: i32, b: i32) -> Result<i32> {
        let value = self.call(action, Args::IntPair(a, b))?;
        value
            .as_int()
            .ok_or_else(|| unexpected(action, Shape::Int, &value))
    }

    /// `String action(String)`.
    pub fn call_str(&self, action: &str, arg: &str) -> Result<String> {
        match self.call(action, Args::Str(arg.to_string()))? {
            Value::Str(s) => Ok(s),
            other => Err(unexpected(action, Shape::Str, &other)),
        }
    }

    /// `float action(float)`.
    pub fn call_float(&self, action: &str, arg: f32) -> Result<f32> {
        let value = self.call(action, Args::Float(arg))?;
        value
            .as_float()
            .ok_or_else(|| unexpected(action, Shape::Float, &value))
    }

    /// Ask the board for its name.
    pub fn card_name(&self) -> Result<String> {
        self.call_str(CARD_NAME_ACTION, "")
    }

    /// Arm the slot and write the call line while holding the link, so a
    /// concurrent disconnect either sees the armed call or the call sees no
    /// link.
    fn send_call(&self, action: &str, args: &Args) -> Result<()> {
        let link = self.lock_link();
        let link = link
            .as_ref()
            .filter(|link| link.state.is_alive())
            .ok_or(PeerError::NotConnected)?;

        self.slot.arm(action);
        // The receive thread marks the link closed before failing the slot.
        if !link.state.is_alive() {
            self.slot.disarm();
            return Err(PeerError::Disconnected(format!("{} closed the stream", self.port)));
        }
        let sent = link
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send_command(action, args);

        sent.map_err(|err| {
            self.slot.disarm();
            if matches!(err, FrameError::Io(_) | FrameError::ConnectionClosed) {
                PeerError::ActionFailed {
                    action: action.to_string(),
                    source: err,
                }
            } else {
                PeerError::Decode(err)
            }
        })
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("port", &self.port)
            .field("baud_rate", &self.baud_rate)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn shutdown_link(mut link: Link) {
    link.state.request_shutdown();
    link.stream.close();
    if let Some(handle) = link.receiver.take() {
        // A handler may disconnect from the receive thread itself.
        if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
            warn!(port = %link.stream.port_name(), "receive thread panicked");
        }
    }
}

fn unexpected(action: &str, expected: Shape, value: &Value) -> PeerError {
    PeerError::UnexpectedResult {
        action: action.to_string(),
        expected,
        actual: value.shape(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serialrpc_transport::MemoryPort;

    use super::*;

    fn quick_config() -> PeerConfig {
        PeerConfig {
            read_poll_interval: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
            ..PeerConfig::default()
        }
    }

    #[test]
    fn call_before_connect_fails_fast() {
        let conn = Connection::new("/dev/ttyUSB0", 9600);
        assert!(!conn.is_connected());
        assert!(matches!(
            conn.call_void("Ping"),
            Err(PeerError::NotConnected)
        ));
        assert_eq!(conn.port_name(), "/dev/ttyUSB0");
        assert_eq!(conn.baud_rate(), 9600);
    }

    #[test]
    fn attach_twice_is_rejected() {
        let (host, _device) = MemoryPort::pair("mem0", 9600);
        let (other, _other_device) = MemoryPort::pair("mem1", 9600);
        let conn = Connection::with_config("mem0", 9600, quick_config());

        conn.attach(host).expect("first attach should succeed");
        assert!(conn.is_connected());
        assert!(matches!(
            conn.attach(other),
            Err(PeerError::AlreadyConnected(_))
        ));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (host, _device) = MemoryPort::pair("mem0", 9600);
        let conn = Connection::with_config("mem0", 9600, quick_config());
        conn.attach(host).expect("attach should succeed");

        conn.disconnect();
        conn.disconnect();
        assert!(!conn.is_connected());
        assert!(matches!(conn.call_void("Ping"), Err(PeerError::NotConnected)));
    }

    #[test]
    fn invalid_call_is_rejected_before_writing() {
        let (host, device) = MemoryPort::pair("mem0", 9600);
        let conn = Connection::with_config("mem0", 9600, quick_config());
        conn.attach(host).expect("attach should succeed");

        let err = conn.call_str("Echo", "two\nlines").unwrap_err();
        assert!(matches!(err, PeerError::Decode(FrameError::LineBreakInField { .. })));
        assert_eq!(device.bytes_available().expect("memory link"), 0);
    }

    #[test]
    fn call_timeout_is_opt_in() {
        let (host, _device) = MemoryPort::pair("mem0", 9600);
        let config = PeerConfig {
            call_timeout: Some(Duration::from_millis(30)),
            ..quick_config()
        };
        let conn = Connection::with_config("mem0", 9600, config);
        conn.attach(host).expect("attach should succeed");

        let err = conn.call_void("Silent").unwrap_err();
        assert!(matches!(err, PeerError::Timeout { ref action, .. } if action == "Silent"));
        assert!(err.is_action_failed());
    }

    #[test]
    fn reattach_after_peer_closed() {
        let conn = Connection::with_config("mem0", 9600, quick_config());

        let (host, device) = MemoryPort::pair("mem0", 9600);
        conn.attach(host).expect("attach should succeed");
        device.close();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while conn.is_connected() {
            assert!(std::time::Instant::now() < deadline, "link should close");
            std::thread::sleep(Duration::from_millis(5));
        }

        let (host, _device) = MemoryPort::pair("mem0", 9600);
        conn.attach(host).expect("reattach should succeed");
        assert!(conn.is_connected());
    }

    #[cfg(unix)]
    #[test]
    fn connect_to_missing_port_is_connection_error() {
        let conn = Connection::with_config("/dev/serialrpc-missing", 9600, quick_config());
        let err = conn.connect().unwrap_err();
        assert!(matches!(err, PeerError::Connection(_)));
        assert!(!conn.is_connected());
    }
}
