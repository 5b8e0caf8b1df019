use std::time::Duration;

use clap::{Args, Subcommand};
use serialrpc_peer::{ConnectionConfig, PeerConfig};
use serialrpc_transport::DEFAULT_BAUD_RATE;

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod call;
pub mod card_name;
pub mod monitor;
pub mod ports;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Call an action on the board and print its result.
    Call(CallArgs),
    /// Print notices and peer calls coming from the board.
    Monitor(MonitorArgs),
    /// Ask the board for its name.
    CardName(CardNameArgs),
    /// List serial ports on this machine.
    Ports(PortsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::CardName(args) => card_name::run(args, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Serial link selection shared by commands that talk to a board.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Serial port device.
    #[arg(long, short = 'p', env = "SERIALRPC_PORT", default_value_t = serialrpc_transport::default_port().to_string())]
    pub port: String,
    /// Baud rate.
    #[arg(long, short = 'b', env = "SERIALRPC_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Wait after opening the port before talking to the board (e.g. 2s, 500ms, 0).
    #[arg(long, default_value = "2s")]
    pub settle: String,
}

impl LinkArgs {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            port: self.port.clone(),
            baud_rate: self.baud,
        }
    }

    pub fn peer_config(&self) -> CliResult<PeerConfig> {
        Ok(PeerConfig {
            settle_delay: parse_duration(&self.settle, true)?,
            ..PeerConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Action name as registered on the board.
    pub action: String,
    /// Two integer arguments (e.g. --ints 2,3).
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        conflicts_with_all = ["text", "float"]
    )]
    pub ints: Option<Vec<i32>>,
    /// One text argument.
    #[arg(long = "str", conflicts_with_all = ["ints", "float"])]
    pub text: Option<String>,
    /// One float argument.
    #[arg(long, allow_negative_numbers = true, conflicts_with_all = ["ints", "text"])]
    pub float: Option<f32>,
    /// Give up waiting for the reply after this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Answer peer calls with result or error frames.
    #[arg(long)]
    pub reply: bool,
}

#[derive(Args, Debug)]
pub struct CardNameArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Give up waiting for the reply after this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str, allow_zero: bool) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 && !allow_zero {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(
            parse_duration("2s", false).expect("2s parses"),
            Duration::from_secs(2)
        );
        assert_eq!(
            parse_duration("150ms", false).expect("150ms parses"),
            Duration::from_millis(150)
        );
        assert_eq!(
            parse_duration("3", false).expect("bare seconds parse"),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn zero_only_where_allowed() {
        assert!(parse_duration("0s", false).is_err());
        assert_eq!(
            parse_duration("0", true).expect("zero settle parses"),
            Duration::ZERO
        );
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("bad", true).is_err());
        assert!(parse_duration("", true).is_err());
        assert!(parse_duration("-1s", true).is_err());
    }
}
