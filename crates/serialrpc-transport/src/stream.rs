use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::memory::MemoryEnd;

/// An open serial link — implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations.
/// On Unix, this wraps a tty device file descriptor; in tests and
/// emulators it wraps one end of an in-memory pair.
///
/// Reads honour the configured read timeout: when no byte arrives in time
/// the read fails with [`std::io::ErrorKind::TimedOut`], which callers treat
/// as "no data yet" rather than a failure. End of stream is reported as
/// `Ok(0)` as usual.
pub struct SerialStream {
    inner: SerialStreamInner,
    port: String,
    baud_rate: u32,
    read_timeout: Option<Duration>,
}

enum SerialStreamInner {
    #[cfg(unix)]
    Tty(std::fs::File),
    Memory(MemoryEnd),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => {
                use std::os::fd::AsRawFd;

                if !crate::tty::poll_readable(file.as_raw_fd(), self.read_timeout)? {
                    return Err(std::io::Error::from(std::io::ErrorKind::TimedOut));
                }
                file.read(buf)
            }
            SerialStreamInner::Memory(end) => end.read(buf, self.read_timeout),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => file.write(buf),
            SerialStreamInner::Memory(end) => end.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => file.flush(),
            SerialStreamInner::Memory(_) => Ok(()),
        }
    }
}

impl SerialStream {
    /// Create a SerialStream from an opened and configured tty device.
    #[cfg(unix)]
    pub(crate) fn from_tty(file: std::fs::File, port: &str, baud_rate: u32) -> Self {
        Self {
            inner: SerialStreamInner::Tty(file),
            port: port.to_string(),
            baud_rate,
            read_timeout: None,
        }
    }

    /// Create a SerialStream from one end of an in-memory pair.
    pub(crate) fn from_memory(end: MemoryEnd, port: &str, baud_rate: u32) -> Self {
        Self {
            inner: SerialStreamInner::Memory(end),
            port: port.to_string(),
            baud_rate,
            read_timeout: None,
        }
    }

    /// Port identifier this stream was opened on.
    pub fn port_name(&self) -> &str {
        &self.port
    }

    /// Line speed this stream was opened with.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Set read timeout for this handle. `None` blocks until data arrives.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Current read timeout.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Number of bytes that can be read without blocking.
    pub fn bytes_available(&self) -> Result<usize> {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => {
                use std::os::fd::AsRawFd;

                crate::tty::bytes_available(file.as_raw_fd()).map_err(Into::into)
            }
            SerialStreamInner::Memory(end) => Ok(end.available()),
        }
    }

    /// Try to clone this stream (duplicates the underlying handle).
    ///
    /// The clone starts without a read timeout.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => SerialStreamInner::Tty(file.try_clone()?),
            SerialStreamInner::Memory(end) => SerialStreamInner::Memory(end.clone()),
        };
        Ok(Self {
            inner,
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            read_timeout: None,
        })
    }

    /// Close the link.
    ///
    /// In-memory links wake blocked readers on both ends with end of stream.
    /// Tty descriptors are released when the last clone is dropped.
    pub fn close(&self) {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(_) => {}
            SerialStreamInner::Memory(end) => end.close(),
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(_) => "tty",
            SerialStreamInner::Memory(_) => "memory",
        };
        f.debug_struct("SerialStream")
            .field("type", &kind)
            .field("port", &self.port)
            .field("baud_rate", &self.baud_rate)
            .finish()
    }
}
