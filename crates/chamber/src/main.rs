mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chamber", version, about = "Causal chamber control CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). CHAMBER_LOG overrides it when set.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Also append logs to this file, as plain text.
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit::SUCCESS,
                _ => exit::USAGE,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    if let Err(err) = init_logging(cli.log_format, cli.log_level, cli.log_file.as_deref()) {
        let path = cli.log_file.unwrap_or_default();
        let err = exit::io_error(&format!("cannot open log file {}", path.display()), err);
        eprintln!("error: {err}");
        std::process::exit(err.code);
    }

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
    use std::time::Duration;

    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "chamber",
            "run",
            "protocol.txt",
            "--port",
            "/dev/ttyUSB1",
            "--ack-timeout",
            "250ms",
            "--output",
            "out.csv",
        ])
        .expect("run args should parse");

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.link.port, "/dev/ttyUSB1");
                assert_eq!(args.link.ack_timeout, Duration::from_millis(250));
                assert_eq!(args.reset_delay, Duration::from_secs(4));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_duration() {
        let err = Cli::try_parse_from(["chamber", "console", "--handshake-timeout", "soon"])
            .expect_err("bad duration should fail");
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_check_variables() {
        let cli = Cli::try_parse_from([
            "chamber",
            "check",
            "protocol.txt",
            "--variables",
            "counter,red,green",
        ])
        .expect("check args should parse");
        match cli.command {
            Command::Check(args) => {
                assert_eq!(
                    args.variables,
                    Some(vec!["counter".into(), "red".into(), "green".into()])
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
