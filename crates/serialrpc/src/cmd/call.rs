use serialrpc_frame::Args;
use serialrpc_peer::Connection;

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};
use crate::output::{print_call_result, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let call_args = resolve_args(&args)?;
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

    let value = board
        .call(&args.action, call_args.clone())
        .map_err(|err| peer_error("call failed", err))?;
    board.disconnect();

    print_call_result(&args.link.port, args.action.trim(), &call_args, &value, format);
    Ok(SUCCESS)
}

fn resolve_args(args: &CallArgs) -> CliResult<Args> {
    if let Some(ints) = &args.ints {
        return match ints.as_slice() {
            [a, b] => Ok(Args::IntPair(*a, *b)),
            _ => Err(CliError::usage("--ints takes exactly two integers")),
        };
    }
    if let Some(text) = &args.text {
        return Ok(Args::Str(text.clone()));
    }
    if let Some(value) = args.float {
        return Ok(Args::Float(value));
    }
    Ok(Args::Void)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cmd::Command;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: Command,
    }

    fn call_args(argv: &[&str]) -> CallArgs {
        let mut full = vec!["serialrpc", "call"];
        full.extend_from_slice(argv);
        match Harness::try_parse_from(full).expect("call args should parse").command {
            Command::Call(args) => args,
            other => panic!("expected call command, got {other:?}"),
        }
    }

    #[test]
    fn no_payload_is_void() {
        let args = call_args(&["Blink"]);
        assert_eq!(resolve_args(&args).expect("resolves"), Args::Void);
    }

    #[test]
    fn int_pair_accepts_negatives() {
        let args = call_args(&["Add", "--ints=-2,7"]);
        assert_eq!(resolve_args(&args).expect("resolves"), Args::IntPair(-2, 7));
    }

    #[test]
    fn text_and_float_payloads() {
        let args = call_args(&["Echo", "--str", "hello board"]);
        assert_eq!(
            resolve_args(&args).expect("resolves"),
            Args::Str("hello board".into())
        );

        let args = call_args(&["Half", "--float=-1.5"]);
        assert_eq!(resolve_args(&args).expect("resolves"), Args::Float(-1.5));
    }
}
