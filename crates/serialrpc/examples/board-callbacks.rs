//! Serve actions the board calls on the host, over a real serial port.
//!
//! Run with:
//!   cargo run --example board-callbacks -- /dev/ttyACM0 9600
//!
//! Registers `Log(String)`, `Scale(float)` and `Max(int, int)` on the host,
//! answers every board call with a result or error frame, and prints board
//! notices until Ctrl-D / EOF on stdin.

use std::io::Read;

use serialrpc::peer::{Connection, EventHandler, PeerCall, PeerConfig, PeerError};
use serialrpc::transport::{default_port, DEFAULT_BAUD_RATE};

struct Printer;

impl EventHandler for Printer {
    fn on_error(&self, error: &PeerError) {
        eprintln!("link error: {error}");
    }

    fn on_notice(&self, message: &str) {
        println!("board says: {message}");
    }

    fn on_peer_call(&self, call: &PeerCall) {
        match &call.outcome {
            Ok(value) => println!("{}({}) -> {value}", call.command.action, call.command.args),
            Err(err) => println!("{}({}) failed: {err}", call.command.action, call.command.args),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| default_port().to_string());
    let baud = match args.next() {
        Some(baud) => baud.parse()?,
        None => DEFAULT_BAUD_RATE,
    };

    let config = PeerConfig {
        reply_to_peer: true,
        ..PeerConfig::default()
    };
    let conn = Connection::with_config(port.as_str(), baud, config).with_event_handler(Printer);

    let registry = conn.registry();
    registry.register_str("Log", |line| {
        println!("[board log] {line}");
        Ok(String::new())
    });
    registry.register_float("Scale", |v| Ok(v * 1.5));
    registry.register_int_pair("Max", |a, b| Ok(a.max(b)));

    conn.connect()?;
    eprintln!("connected to {port} at {baud} baud; EOF on stdin to quit");

    let mut sink = Vec::new();
    std::io::stdin().read_to_end(&mut sink)?;

    conn.disconnect();
    Ok(())
}
