use std::time::Duration;

use serialrpc_frame::FrameConfig;
use serialrpc_transport::DEFAULT_BAUD_RATE;

/// Default wait after opening a physical port. Most boards reset when the
/// port opens and drop whatever arrives during their bootloader window.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
/// Default receive-thread poll interval.
pub const DEFAULT_READ_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default pause after a non-transient read error.
pub const DEFAULT_IO_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: serialrpc_transport::default_port().to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Connection behavior.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Give up waiting for a reply after this long. `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// How often the receive thread wakes to check for shutdown.
    pub read_poll_interval: Duration,
    /// Wait after opening a physical port before the first call.
    pub settle_delay: Duration,
    /// Answer each peer call with a result or error frame.
    pub reply_to_peer: bool,
    /// Pause after a non-transient read error before reading again.
    pub io_error_backoff: Duration,
    /// Frame decoding limits. `read_timeout` is ignored; the receive thread
    /// polls with `read_poll_interval`.
    pub frame: FrameConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            call_timeout: None,
            read_poll_interval: DEFAULT_READ_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            reply_to_peer: false,
            io_error_backoff: DEFAULT_IO_ERROR_BACKOFF,
            frame: FrameConfig::default(),
        }
    }
}
