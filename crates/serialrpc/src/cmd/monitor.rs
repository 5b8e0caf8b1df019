use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use serialrpc_peer::{ChannelEventHandler, Connection, PeerError, PeerEvent};

use crate::cmd::MonitorArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

const POLL: Duration = Duration::from_millis(200);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = args.link.peer_config()?;
    config.reply_to_peer = args.reply;

    let (handler, events) = ChannelEventHandler::new();
    let board = Connection::from_config(&args.link.connection_config(), config)
        .with_event_handler(handler);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    board
        .connect()
        .map_err(|err| peer_error("connect failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let closed = matches!(event, PeerEvent::Error(PeerError::Disconnected(_)));
        print_event(&event, format);
        printed = printed.saturating_add(1);

        if closed {
            tracing::info!(port = %args.link.port, "board closed the link");
            break;
        }
        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    board.disconnect();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
