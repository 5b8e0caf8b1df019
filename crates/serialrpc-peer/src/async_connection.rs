//! Async facade over [`Connection`].
//!
//! The wire protocol allows one call at a time and the connection already
//! queues callers fairly, so this wrapper only moves the blocking wait onto
//! tokio's blocking pool.

use std::sync::Arc;

use serialrpc_frame::{Args, Value};
use serialrpc_transport::SerialStream;

use crate::connection::Connection;
use crate::error::{PeerError, Result};

#[derive(Debug, Clone)]
pub struct AsyncConnection {
    inner: Arc<Connection>,
}

impl AsyncConnection {
    pub fn new(connection: Connection) -> Self {
        Self {
            inner: Arc::new(connection),
        }
    }

    /// The wrapped blocking connection.
    pub fn blocking(&self) -> &Connection {
        &self.inner
    }

    #[cfg(unix)]
    pub async fn connect(&self) -> Result<()> {
        self.run(|conn| conn.connect()).await
    }

    pub async fn attach(&self, stream: SerialStream) -> Result<()> {
        self.run(move |conn| conn.attach(stream)).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.run(|conn| {
            conn.disconnect();
            Ok(())
        })
        .await
    }

    pub async fn call(&self, action: &str, args: Args) -> Result<Value> {
        let action = action.to_string();
        self.run(move |conn| conn.call(&action, args)).await
    }

    pub async fn call_void(&self, action: &str) -> Result<()> {
        let action = action.to_string();
        self.run(move |conn| conn.call_void(&action)).await
    }

    pub async fn call_int_pair(&self, action: &str, a: i32, b: i32) -> Result<i32> {
        let action = action.to_string();
        self.run(move |conn| conn.call_int_pair(&action, a, b)).await
    }

    pub async fn call_str(&self, action: &str, arg: &str) -> Result<String> {
        let action = action.to_string();
        let arg = arg.to_string();
        self.run(move |conn| conn.call_str(&action, &arg)).await
    }

    pub async fn call_float(&self, action: &str, arg: f32) -> Result<f32> {
        let action = action.to_string();
        self.run(move |conn| conn.call_float(&action, arg)).await
    }

    pub async fn card_name(&self) -> Result<String> {
        self.run(|conn| conn.card_name()).await
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&conn))
            .await
            .map_err(|err| PeerError::Task(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::time::Duration;

    use serialrpc_frame::{decode_command_line, Frame, FrameWriter};
    use serialrpc_transport::MemoryPort;

    use super::*;
    use crate::config::PeerConfig;

    #[tokio::test]
    async fn async_call_round_trip() {
        let (host, device) = MemoryPort::pair("mem0", 9600);
        let device_thread = std::thread::spawn(move || {
            let mut writer = FrameWriter::new(device.try_clone().expect("clone"));
            let mut lines = BufReader::new(device).lines();
            let line = lines.next().expect("a call").expect("readable");
            let command = decode_command_line(&line).expect("valid call");
            let sum = match command.args {
                Args::IntPair(a, b) => a + b,
                other => panic!("unexpected args {other:?}"),
            };
            writer
                .write_frame(&Frame::Result(Value::Int(sum)))
                .expect("reply written");
        });

        let config = PeerConfig {
            read_poll_interval: Duration::from_millis(10),
            ..PeerConfig::default()
        };
        let conn = AsyncConnection::new(Connection::with_config("mem0", 9600, config));
        conn.attach(host).await.expect("attach");

        assert_eq!(conn.call_int_pair("Add", 20, 22).await.expect("call"), 42);
        device_thread.join().expect("device thread");

        conn.disconnect().await.expect("disconnect");
        assert!(!conn.blocking().is_connected());
    }
}
