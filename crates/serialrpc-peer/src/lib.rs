//! Synchronous RPC over a serial link.
//!
//! A [`Connection`] calls named actions on a microcontroller and blocks for
//! the reply, and runs actions registered in its [`ActionRegistry`] when the
//! board calls back. One call is in flight at a time; concurrent callers are
//! served in arrival order.

mod call;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
mod receiver;
pub mod registry;

#[cfg(feature = "async")]
pub mod async_connection;

pub use config::{
    ConnectionConfig, PeerConfig, DEFAULT_IO_ERROR_BACKOFF, DEFAULT_READ_POLL_INTERVAL,
    DEFAULT_SETTLE_DELAY,
};
pub use connection::{Connection, CARD_NAME_ACTION};
pub use error::{BoxError, PeerError, Result};
pub use handler::{ChannelEventHandler, EventHandler, LogEventHandler, PeerCall, PeerEvent};
pub use registry::{ActionRegistry, Handler};

#[cfg(feature = "async")]
pub use async_connection::AsyncConnection;
