//! Concurrent calls from async tasks against an emulated board.
//!
//! Run with:
//!   cargo run --example async-call --features async
//!
//! Several tasks call `Add` at once; the connection admits them one at a
//! time and each gets its own sum back.

use std::io::{BufRead, BufReader};

use serialrpc::frame::{decode_command_line, Args, Frame, FrameWriter, Value};
use serialrpc::peer::{AsyncConnection, Connection};
use serialrpc::transport::MemoryPort;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host, board) = MemoryPort::pair("emulated", 9600);
    std::thread::spawn(move || {
        let Ok(clone) = board.try_clone() else { return };
        let mut writer = FrameWriter::new(clone);
        for line in BufReader::new(board).lines() {
            let Ok(line) = line else { break };
            let reply = match decode_command_line(&line).map(|call| call.args) {
                Ok(Args::IntPair(a, b)) => Value::Int(a + b),
                _ => Value::Void,
            };
            if writer.write_frame(&Frame::Result(reply)).is_err() {
                break;
            }
        }
    });

    let conn = AsyncConnection::new(Connection::new("emulated", 9600));
    conn.attach(host).await?;

    let mut tasks = Vec::new();
    for i in 0..4 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            conn.call_int_pair("Add", i, 10).await.map(|sum| (i, sum))
        }));
    }

    for task in tasks {
        let (i, sum) = task.await??;
        println!("{i} + 10 = {sum}");
    }

    conn.disconnect().await?;
    Ok(())
}
