use crate::cmd::PortsArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[cfg(unix)]
pub fn run(_args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let ports = serialrpc_transport::scan_ports()
        .map_err(|err| crate::exit::transport_error("port scan failed", err))?;
    crate::output::print_ports(&ports, format);
    Ok(SUCCESS)
}

#[cfg(not(unix))]
pub fn run(_args: PortsArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::FAILURE,
        "port scanning is only supported on Unix",
    ))
}
