use std::io::{ErrorKind, Write};
use std::time::Duration;

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_command, encode_frame, Frame};
use crate::error::{FrameError, Result};
use crate::shape::Args;

const INITIAL_BUFFER_CAPACITY: usize = 256;
/// Pause before retrying a write the stream refused with `WouldBlock`.
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(1);

/// Writes calls and frames to any `Write` stream.
///
/// Each message is encoded completely before the first byte is written, so
/// an encoding error never leaves half a message on the wire.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Send a call line (`<action> <tag><value>`).
    pub fn send_command(&mut self, action: &str, args: &Args) -> Result<()> {
        self.buf.clear();
        encode_command(action, args, &mut self.buf)?;
        trace!(action, shape = %args.shape(), "sending call");
        self.write_buffered()
    }

    /// Send a preamble frame, as the device side does.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;
        trace!(kind = ?frame.kind(), "sending frame");
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(WOULD_BLOCK_BACKOFF);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(WOULD_BLOCK_BACKOFF);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serialrpc_transport::MemoryPort;

    use super::*;
    use crate::codec::{decode_command_line, Command, Decoded, RemoteError};
    use crate::reader::FrameReader;
    use crate::shape::Value;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn send_command_writes_one_line() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.send_command("Add", &Args::IntPair(2, 3)).unwrap();
        writer.send_command("Ping", &Args::Void).unwrap();

        assert_eq!(written(writer), b"Add H2,3\nPing V\n");
    }

    #[test]
    fn rejected_command_writes_nothing() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let err = writer
            .send_command("Echo", &Args::Str("line\r\nbreak".into()))
            .unwrap_err();
        assert!(matches!(err, FrameError::LineBreakInField { .. }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn device_side_roundtrip_over_memory_link() {
        let (host, device) = MemoryPort::pair("mem0", 9600);
        let mut host_writer = FrameWriter::new(host.try_clone().unwrap());
        let mut host_reader = FrameReader::new(host);
        let mut device_writer = FrameWriter::new(device.try_clone().unwrap());
        let mut device_lines = std::io::BufRead::lines(std::io::BufReader::new(device));

        host_writer.send_command("Echo", &Args::Str("hi".into())).unwrap();
        let line = device_lines.next().unwrap().unwrap();
        assert_eq!(
            decode_command_line(&line).unwrap(),
            Command::new("Echo", Args::Str("hi".into()))
        );

        device_writer
            .write_frame(&Frame::Result(Value::Str("hi".into())))
            .unwrap();
        device_writer
            .write_frame(&Frame::Error(RemoteError {
                action: "Boom".into(),
                message: "nope".into(),
            }))
            .unwrap();

        assert_eq!(
            host_reader.read_frame().unwrap(),
            Decoded::Frame(Frame::Result(Value::Str("hi".into())))
        );
        assert!(matches!(
            host_reader.read_frame().unwrap(),
            Decoded::Frame(Frame::Error(_))
        ));
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send_command("Ping", &Args::Void).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_and_would_block_retry() {
        let sink = FlakyWriter {
            calls: 0,
            data: Vec::new(),
        };
        let mut writer = FrameWriter::new(sink);
        writer.write_frame(&Frame::Notice("ok".into())).unwrap();
        assert_eq!(writer.get_ref().data, b"MArC_msg\nok\n");
    }

    #[test]
    fn would_block_pauses_before_retrying() {
        const REFUSALS: usize = 5;
        let mut writer = FrameWriter::new(BusyWriter {
            refusals: REFUSALS,
            data: Vec::new(),
        });

        let started = std::time::Instant::now();
        writer.send_command("Ping", &Args::Void).unwrap();

        assert!(started.elapsed() >= WOULD_BLOCK_BACKOFF * REFUSALS as u32);
        assert_eq!(writer.get_ref().data, b"Ping V\n");
    }

    struct BusyWriter {
        refusals: usize,
        data: Vec<u8>,
    }

    impl Write for BusyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.refusals > 0 {
                self.refusals -= 1;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FlakyWriter {
        calls: usize,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            match self.calls {
                1 => Err(std::io::Error::from(ErrorKind::Interrupted)),
                2 => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                _ => {
                    let n = buf.len().min(3);
                    self.data.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
