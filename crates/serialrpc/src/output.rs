use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serialrpc_frame::{Args, Value};
use serialrpc_peer::{PeerCall, PeerEvent};
#[cfg(unix)]
use serialrpc_transport::PortInfo;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    port: &'a str,
    action: &'a str,
    args: String,
    args_shape: &'static str,
    result: serde_json::Value,
    result_shape: &'static str,
    timestamp: String,
}

/// Print the result of a host-initiated call.
pub fn print_call_result(port: &str, action: &str, args: &Args, value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                port,
                action,
                args: args.to_string(),
                args_shape: args.shape().name(),
                result: value_json(value),
                result_shape: value.shape().name(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "ACTION", "ARGS", "RESULT", "SHAPE"])
                .add_row(vec![
                    port.to_string(),
                    action.to_string(),
                    args.to_string(),
                    value_text(value),
                    value.shape().name().to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{action}({args}) = {} [{}] on {port}",
                value_text(value),
                value.shape()
            );
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    timestamp: String,
}

/// Print a receive-side event (monitor mode).
pub fn print_event(event: &PeerEvent, format: OutputFormat) {
    let out = match event {
        PeerEvent::Notice(message) => EventOutput {
            event: "notice",
            action: None,
            args: None,
            result: None,
            message: Some(message.clone()),
            timestamp: now_unix_seconds(),
        },
        PeerEvent::PeerCall(PeerCall { command, outcome }) => EventOutput {
            event: "peer_call",
            action: Some(&command.action),
            args: Some(command.args.to_string()),
            result: outcome.as_ref().ok().map(value_json),
            message: outcome.as_ref().err().map(ToString::to_string),
            timestamp: now_unix_seconds(),
        },
        PeerEvent::Error(err) => EventOutput {
            event: "error",
            action: None,
            args: None,
            result: None,
            message: Some(err.to_string()),
            timestamp: now_unix_seconds(),
        },
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "ACTION", "ARGS", "RESULT", "MESSAGE"])
                .add_row(vec![
                    out.event.to_string(),
                    out.action.unwrap_or("-").to_string(),
                    out.args.clone().unwrap_or_else(|| "-".to_string()),
                    out.result
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "-".to_string()),
                    out.message.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match event {
            PeerEvent::Notice(message) => println!("notice: {message}"),
            PeerEvent::PeerCall(PeerCall { command, outcome }) => match outcome {
                Ok(value) => println!(
                    "peer call: {}({}) = {}",
                    command.action,
                    command.args,
                    value_text(value)
                ),
                Err(err) => println!("peer call: {}({}) failed: {err}", command.action, command.args),
            },
            PeerEvent::Error(err) => println!("error: {err}"),
        },
    }
}

#[cfg(unix)]
#[derive(Serialize)]
struct PortOutput<'a> {
    path: &'a str,
    status: &'static str,
}

#[cfg(unix)]
pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<_> = ports
                .iter()
                .map(|port| PortOutput {
                    path: &port.path,
                    status: port.status.as_str(),
                })
                .collect();
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "STATUS"]);
            for port in ports {
                table.add_row(vec![port.path.clone(), port.status.as_str().to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if ports.is_empty() {
                println!("no serial ports found");
            }
            for port in ports {
                println!("{} ({})", port.path, port.status.as_str());
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Void => serde_json::Value::Null,
        Value::Int(v) => serde_json::Value::from(*v),
        Value::Float(v) => serde_json::Value::from(*v),
        Value::Str(v) => serde_json::Value::from(v.as_str()),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Void => "(void)".to_string(),
        Value::Str(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_results_serialize_as_null() {
        assert_eq!(value_json(&Value::Void), serde_json::Value::Null);
        assert_eq!(value_json(&Value::Int(-3)), serde_json::json!(-3));
        assert_eq!(value_json(&Value::Str("ok".into())), serde_json::json!("ok"));
    }

    #[test]
    fn text_values_are_quoted() {
        assert_eq!(value_text(&Value::Str("a b".into())), "\"a b\"");
        assert_eq!(value_text(&Value::Float(0.5)), "0.5");
    }
}
