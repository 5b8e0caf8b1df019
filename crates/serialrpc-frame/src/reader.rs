use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use serialrpc_transport::SerialStream;
use tracing::trace;

use crate::codec::{decode_frame, Decoded, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally: callers always get complete frames.
/// Bytes of a frame still in flight survive a read timeout, so a caller
/// polling with a short timeout can simply call [`read_frame`] again.
///
/// [`read_frame`]: FrameReader::read_frame
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame or fragment (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A
    /// read timeout surfaces as an I/O error for which
    /// [`FrameError::is_transient`] is true.
    pub fn read_frame(&mut self) -> Result<Decoded> {
        loop {
            if let Some(decoded) = decode_frame(&mut self.buf, self.config.max_line_len)? {
                return Ok(decoded);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    trace!(pending = self.buf.len(), "stream closed mid-frame");
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<SerialStream> {
    /// Create a frame reader for a `SerialStream` and apply the read timeout
    /// from config.
    pub fn with_config_serial(mut inner: SerialStream, config: FrameConfig) -> Self {
        inner.set_read_timeout(config.read_timeout);
        Self::with_config(inner, config)
    }
}
