use serialrpc_frame::{Args, Value};
use serialrpc_peer::{Connection, CARD_NAME_ACTION};

use crate::cmd::{parse_duration, CardNameArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_call_result, OutputFormat};

pub fn run(args: CardNameArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = args.link.peer_config()?;
    config.call_timeout = args
        .timeout
        .as_deref()
        .map(|t| parse_duration(t, false))
        .transpose()?;

    let board = Connection::from_config(&args.link.connection_config(), config);
    board
        .connect()
        .map_err(|err| peer_error("connect failed", err))?;
    let name = board
        .card_name()
        .map_err(|err| peer_error("card name query failed", err))?;
    board.disconnect();

    print_call_result(
        &args.link.port,
        CARD_NAME_ACTION,
        &request_args(),
        &Value::Str(name),
        format,
    );
    Ok(SUCCESS)
}

/// What `Connection::card_name` puts on the wire: an empty string argument.
fn request_args() -> Args {
    Args::Str(String::new())
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use serialrpc_frame::encode_command;

    use super::*;

    #[test]
    fn reported_args_match_the_call_line() {
        let mut line = BytesMut::new();
        encode_command(CARD_NAME_ACTION, &request_args(), &mut line)
            .expect("card name call encodes");
        assert_eq!(&line[..], b"GetCardName S\n");
    }
}
