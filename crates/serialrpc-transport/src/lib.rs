//! Serial byte-stream transport.
//!
//! Provides the raw byte pipe the RPC layers run over:
//! - Unix tty devices (Linux/macOS), opened raw 8N1 and exclusively locked
//! - An in-memory pair for tests and device emulators
//!
//! This is the lowest layer of serialrpc. Everything else builds on top of
//! the [`SerialStream`] type provided here.

pub mod error;
pub mod memory;
pub mod stream;

#[cfg(unix)]
pub mod tty;

pub use error::{Result, TransportError};
pub use memory::MemoryPort;
pub use stream::SerialStream;

#[cfg(unix)]
pub use tty::{scan_ports, PortInfo, PortStatus, TtyPort, SUPPORTED_BAUD_RATES};

/// Default port on macOS with an FTDI adapter.
pub const MAC_OS_DEFAULT_PORT: &str = "/dev/tty.usbserial-A9007UX1";
/// Default port on a Raspberry Pi.
pub const RASPBERRY_PI_DEFAULT_PORT: &str = "/dev/ttyACM0";
/// Default port on Linux.
pub const LINUX_DEFAULT_PORT: &str = "/dev/ttyUSB0";
/// Default port on Windows.
pub const WINDOWS_DEFAULT_PORT: &str = "COM5";

/// Default baud rate used by the CLI and examples.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Platform default port name.
pub fn default_port() -> &'static str {
    if cfg!(target_os = "macos") {
        MAC_OS_DEFAULT_PORT
    } else if cfg!(windows) {
        WINDOWS_DEFAULT_PORT
    } else {
        LINUX_DEFAULT_PORT
    }
}
