//! Host and an emulated board over an in-memory link; no hardware needed.
//!
//! Run with:
//!   cargo run --example emulated-board
//!
//! The board thread answers `Add`, `Shout`, `Half` and `GetCardName`, and
//! calls the host's `Ping` action once before it answers the first call.

use std::io::{BufRead, BufReader};
use std::thread;

use serialrpc::frame::{decode_command_line, Args, Command, Frame, FrameWriter, RemoteError, Value};
use serialrpc::peer::{Connection, PeerConfig};
use serialrpc::transport::{MemoryPort, SerialStream};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host, board) = MemoryPort::pair("emulated", 9600);
    let board = thread::Builder::new()
        .name("emulated-board".into())
        .spawn(move || run_board(board))?;

    let config = PeerConfig {
        reply_to_peer: true,
        ..PeerConfig::default()
    };
    let conn = Connection::with_config("emulated", 9600, config);
    conn.registry().register_void("Ping", || {
        eprintln!("host: board pinged us");
        Ok(())
    });
    conn.attach(host)?;

    println!("card name: {}", conn.card_name()?);
    println!("2 + 3 = {}", conn.call_int_pair("Add", 2, 3)?);
    println!("shout: {}", conn.call_str("Shout", "hello board")?);
    println!("half of 5: {}", conn.call_float("Half", 5.0)?);

    match conn.call_void("Explode") {
        Ok(()) => println!("Explode unexpectedly succeeded"),
        Err(err) => println!("Explode failed as expected: {err}"),
    }

    conn.disconnect();
    if board.join().is_err() {
        eprintln!("board thread panicked");
    }
    Ok(())
}

fn run_board(stream: SerialStream) {
    let mut writer = match stream.try_clone() {
        Ok(clone) => FrameWriter::new(clone),
        Err(err) => {
            eprintln!("board: cannot clone stream: {err}");
            return;
        }
    };

    let mut pinged = false;
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { break };
        let Ok(call) = decode_command_line(&line) else {
            continue;
        };

        if !pinged {
            pinged = true;
            let ping = Frame::Command(Command::new("Ping", Args::Void));
            let notice = Frame::Notice("board ready".into());
            if writer.write_frame(&notice).is_err() || writer.write_frame(&ping).is_err() {
                break;
            }
        }

        if writer.write_frame(&answer(&call)).is_err() {
            break;
        }
    }
}

fn answer(call: &Command) -> Frame {
    match (call.action.as_str(), &call.args) {
        ("GetCardName", Args::Str(_)) => Frame::Result(Value::Str("Emulated Uno".into())),
        ("Add", Args::IntPair(a, b)) => Frame::Result(Value::Int(a.wrapping_add(*b))),
        ("Shout", Args::Str(s)) => Frame::Result(Value::Str(s.to_uppercase())),
        ("Half", Args::Float(v)) => Frame::Result(Value::Float(v / 2.0)),
        (action, _) => Frame::Error(RemoteError {
            action: action.to_string(),
            message: "unknown action".into(),
        }),
    }
}
