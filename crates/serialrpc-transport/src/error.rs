/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The port does not exist or cannot be opened.
    #[error("port {port} unavailable: {source}")]
    PortUnavailable {
        port: String,
        source: std::io::Error,
    },

    /// Another process holds the port.
    #[error("port {port} is busy (held by another process)")]
    PortBusy { port: String },

    /// The requested baud rate is not supported by the platform.
    #[error("unsupported baud rate: {baud}")]
    UnsupportedBaudRate { baud: u32 },

    /// Applying line settings to the device failed.
    #[error("failed to configure {port}: {source}")]
    Configure {
        port: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Returns true for failures that may succeed if retried with other
    /// parameters or after the port is released.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::PortBusy { .. } | TransportError::UnsupportedBaudRate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
