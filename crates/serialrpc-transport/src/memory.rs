use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::stream::SerialStream;

/// In-memory serial link.
///
/// Produces two connected [`SerialStream`]s: bytes written to one end are
/// read from the other. Used by tests and by device emulators that stand in
/// for a real board.
pub struct MemoryPort;

impl MemoryPort {
    /// Create a connected pair. The first stream is the host end, the second
    /// the device end; both report `port` as their port name.
    pub fn pair(port: &str, baud_rate: u32) -> (SerialStream, SerialStream) {
        let to_device = Arc::new(Pipe::default());
        let to_host = Arc::new(Pipe::default());

        let host = MemoryEnd {
            rx: Arc::clone(&to_host),
            tx: Arc::clone(&to_device),
        };
        let device = MemoryEnd {
            rx: to_device,
            tx: to_host,
        };
        debug!(port, baud_rate, "created in-memory serial pair");

        (
            SerialStream::from_memory(host, port, baud_rate),
            SerialStream::from_memory(device, port, baud_rate),
        )
    }
}

#[derive(Default)]
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

#[derive(Default)]
struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

impl Pipe {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_all();
    }
}

/// One end of an in-memory link.
#[derive(Clone)]
pub(crate) struct MemoryEnd {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
}

impl MemoryEnd {
    pub(crate) fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.rx.lock();
        while state.buf.is_empty() && !state.closed {
            state = match deadline {
                None => self
                    .rx
                    .readable
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(std::io::Error::from(ErrorKind::TimedOut));
                    }
                    self.rx
                        .readable
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }

        let n = buf.len().min(state.buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    pub(crate) fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.tx.lock();
        if state.closed {
            return Err(std::io::Error::from(ErrorKind::BrokenPipe));
        }
        state.buf.extend(buf);
        drop(state);
        self.tx.readable.notify_all();
        Ok(buf.len())
    }

    pub(crate) fn available(&self) -> usize {
        self.rx.lock().buf.len()
    }

    pub(crate) fn close(&self) {
        self.rx.close();
        self.tx.close();
    }
}
