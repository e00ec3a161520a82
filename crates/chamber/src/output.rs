use std::io::{IsTerminal, Write};

use chamber_board::RunSummary;
use chamber_transport::TransportStats;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

pub fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

#[derive(Serialize)]
struct RunOutput<'a> {
    instructions: Option<usize>,
    observations: Option<u64>,
    elapsed_secs: Option<f64>,
    transport: &'a TransportStats,
}

/// Print transport statistics, with run totals when a protocol ran.
pub fn print_stats(stats: &TransportStats, summary: Option<&RunSummary>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&RunOutput {
            instructions: summary.map(|s| s.instructions),
            observations: summary.map(|s| s.observations),
            elapsed_secs: summary.map(|s| s.elapsed.as_secs_f64()),
            transport: stats,
        }),
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["COUNTER", "VALUE"]);
            if let Some(summary) = summary {
                table.add_row(vec!["instructions".to_string(), summary.instructions.to_string()]);
                table.add_row(vec!["observations".to_string(), summary.observations.to_string()]);
                table.add_row(vec![
                    "elapsed".to_string(),
                    format!("{:.2}s", summary.elapsed.as_secs_f64()),
                ]);
            }
            for (name, value) in stats_rows(stats) {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            if let Some(summary) = summary {
                println!(
                    "Ran {} instructions ({} observations) in {:.2} seconds",
                    summary.instructions,
                    summary.observations,
                    summary.elapsed.as_secs_f64()
                );
            }
            println!("{stats}");
        }
    }
}

fn stats_rows(stats: &TransportStats) -> [(&'static str, u64); 8] {
    [
        ("last delivered", u64::from(stats.last_delivered)),
        ("last acknowledged", u64::from(stats.last_acknowledged)),
        ("unexpected segments", stats.unexpected),
        ("resent ACKs", stats.ack_resends),
        ("resent segments", stats.resends),
        ("failed checksums", stats.failed_checksums),
        ("ACK timeouts", stats.ack_timeouts),
        ("write timeouts", stats.write_timeouts),
    ]
}

#[derive(Serialize)]
struct ReplyOutput {
    size: usize,
    reply: String,
}

/// Print one message received from the board.
pub fn print_reply(payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReplyOutput {
            size: payload.len(),
            reply: payload_preview(payload),
        }),
        OutputFormat::Table => {
            let mut table = table();
            table
                .set_header(vec!["SIZE", "REPLY"])
                .add_row(vec![payload.len().to_string(), payload_preview(payload)]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("  {}", payload_preview(payload)),
        OutputFormat::Raw => print_raw(payload),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

/// Text replies verbatim, telemetry records as little-endian floats.
pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) if payload.len() % 4 == 0 => {
            let values: Vec<String> = payload
                .chunks_exact(4)
                .map(|c| format!("{:?}", f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect();
            format!("<record {}>", values.join(","))
        }
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
