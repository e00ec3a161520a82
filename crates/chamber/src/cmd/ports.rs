use chamber_serial::{list_ports, PortInfo};
use serde::Serialize;

use crate::cmd::PortsArgs;
use crate::exit::{serial_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Debug, Serialize)]
struct PortOutput<'a> {
    name: &'a str,
    kind: &'a str,
    description: Option<&'a str>,
}

impl<'a> From<&'a PortInfo> for PortOutput<'a> {
    fn from(port: &'a PortInfo) -> Self {
        Self {
            name: &port.name,
            kind: port.kind,
            description: port.description.as_deref(),
        }
    }
}

pub fn run(_args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let ports = list_ports().map_err(|err| serial_error("cannot list ports", err))?;
    tracing::debug!(count = ports.len(), "enumerated serial ports");
    print_ports(&ports, format);
    Ok(SUCCESS)
}

fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<PortOutput<'_>> = ports.iter().map(PortOutput::from).collect();
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["PORT", "KIND", "DESCRIPTION"]);
            for port in ports {
                table.add_row(vec![
                    port.name.clone(),
                    port.kind.to_string(),
                    port.description.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                match &port.description {
                    Some(description) => println!("{} ({}, {description})", port.name, port.kind),
                    None => println!("{} ({})", port.name, port.kind),
                }
            }
        }
        OutputFormat::Raw => {
            for port in ports {
                println!("{}", port.name);
            }
        }
    }
}
