//! Synchronous RPC between a host and a microcontroller over a serial link.
//!
//! The host calls named actions on the board and blocks for the result; the
//! board can call actions registered on the host the same way.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial byte streams (Unix tty, in-memory pair)
//! - [`frame`]: the line-oriented wire format
//! - [`peer`]: connections, calls and action dispatch (behind `peer` feature)
//!
//! ```no_run
//! use serialrpc::peer::Connection;
//!
//! let board = Connection::new("/dev/ttyACM0", 9600);
//! board.connect()?;
//! let sum = board.call_int_pair("Add", 2, 3)?;
//! assert_eq!(sum, 5);
//! # Ok::<(), serialrpc::peer::PeerError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use serialrpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serialrpc_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use serialrpc_peer::*;
}
