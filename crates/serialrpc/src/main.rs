mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "serialrpc",
    version,
    about = "Call actions on a microcontroller over a serial link"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). SERIALRPC_LOG overrides it.
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "serialrpc",
            "call",
            "Add",
            "--port",
            "/dev/ttyACM0",
            "--ints",
            "2,3",
        ])
        .expect("call args should parse");

        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.action, "Add");
                assert_eq!(args.link.port, "/dev/ttyACM0");
                assert_eq!(args.ints, Some(vec![2, 3]));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "serialrpc",
            "call",
            "Add",
            "--ints",
            "1,2",
            "--str",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_monitor_subcommand() {
        let cli = Cli::try_parse_from([
            "serialrpc",
            "monitor",
            "--baud",
            "115200",
            "--settle",
            "0",
            "--count",
            "3",
            "--reply",
        ])
        .expect("monitor args should parse");

        match cli.command {
            Command::Monitor(args) => {
                assert_eq!(args.link.baud, 115200);
                assert_eq!(args.count, Some(3));
                assert!(args.reply);
            }
            other => panic!("expected monitor, got {other:?}"),
        }
    }

    #[test]
    fn parses_card_name_subcommand() {
        let cli = Cli::try_parse_from(["serialrpc", "card-name", "--timeout", "3s"])
            .expect("card-name args should parse");
        assert!(matches!(cli.command, Command::CardName(_)));
    }
}
