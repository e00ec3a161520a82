use std::path::PathBuf;
use std::time::Duration;

use chamber_board::{Board, BoardConfig};
use chamber_frame::{DiscardPolicy, FrameConfig};
use chamber_serial::{SerialChannel, SerialSettings, DEFAULT_BAUD_RATE, DEFAULT_PORT};
use chamber_transport::{RetryPolicy, TransportConfig};
use clap::{Args, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use crate::exit::{board_error, serial_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod check;
pub mod console;
pub mod ports;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute an experiment protocol and record observations as CSV.
    Run(RunArgs),
    /// Send commands typed on stdin and print the board's replies.
    Console(ConsoleArgs),
    /// Validate a protocol file without a board.
    Check(CheckArgs),
    /// List serial ports.
    Ports(PortsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Console(args) => console::run(args, format),
        Command::Check(args) => check::run(args, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Stray-byte handling between frames.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum DiscardArg {
    Ignore,
    Warn,
    Fail,
}

impl From<DiscardArg> for DiscardPolicy {
    fn from(arg: DiscardArg) -> Self {
        match arg {
            DiscardArg::Ignore => DiscardPolicy::Ignore,
            DiscardArg::Warn => DiscardPolicy::Warn,
            DiscardArg::Fail => DiscardPolicy::Fail,
        }
    }
}

/// Serial link and session settings shared by board-facing commands.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Serial port of the chamber control board.
    #[arg(long, env = "CHAMBER_PORT", default_value = DEFAULT_PORT)]
    pub port: String,
    /// Line speed in baud.
    #[arg(long, env = "CHAMBER_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Wait for an acknowledgement before resending (e.g. 100ms).
    #[arg(long, value_parser = parse_duration, default_value = "100ms")]
    pub ack_timeout: Duration,
    /// Give up on a segment after this many transmissions.
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Give up on a segment after this long (e.g. 30s).
    #[arg(long, value_parser = parse_duration)]
    pub send_deadline: Option<Duration>,
    /// Bound on the board announcing itself after a reset.
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub handshake_timeout: Duration,
    /// Per-record bound during a measurement, on top of its sample wait.
    #[arg(long, value_parser = parse_duration, default_value = "1s")]
    pub observation_timeout: Duration,
    /// Handling of stray bytes between frames.
    #[arg(long, value_name = "POLICY", default_value = "warn")]
    pub discarded: DiscardArg,
}

impl LinkArgs {
    pub fn board_config(&self) -> BoardConfig {
        let retry = RetryPolicy {
            max_attempts: self.max_attempts.map(|n| n.max(1)),
            deadline: self.send_deadline,
        };
        BoardConfig {
            handshake_timeout: self.handshake_timeout,
            observation_timeout: self.observation_timeout,
            transport: TransportConfig {
                ack_timeout: self.ack_timeout,
                retry,
                ..TransportConfig::default()
            },
            frame: FrameConfig {
                discarded: self.discarded.into(),
                ..FrameConfig::default()
            },
            ..BoardConfig::default()
        }
    }

    /// Open the port, reset the board and complete the handshake.
    pub fn open_board(&self) -> CliResult<Board<SerialChannel, SerialChannel>> {
        let settings = SerialSettings {
            path: self.port.clone(),
            baud_rate: self.baud,
        };
        tracing::info!(port = %settings.path, baud = settings.baud_rate, "opening port");
        let channel = SerialChannel::open_with(&settings)
            .map_err(|err| serial_error("cannot open port", err))?;
        Board::open(channel, self.board_config()).map_err(|err| board_error("handshake failed", err))
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Protocol file, one instruction per line.
    pub protocol: PathBuf,
    /// CSV file for observations, `-` for stdout. Defaults to
    /// `<protocol>_<YYYY_MM_DD-HH_MM_SS>.csv` in --output-dir.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
    /// Directory for the default CSV file.
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
    /// Wait after the final reset before closing the port.
    #[arg(long, value_parser = parse_duration, default_value = "4s")]
    pub reset_delay: Duration,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    /// Bound on each reply (e.g. 5s). Waits indefinitely when unset.
    #[arg(long, value_parser = parse_duration)]
    pub reply_timeout: Option<Duration>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Protocol file to validate.
    pub protocol: PathBuf,
    /// Device variables that SET may target (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub variables: Option<Vec<String>>,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
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
        .map_err(|_| format!("invalid duration: {input}"))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Cancel `token` on Ctrl-C.
pub fn install_ctrlc_handler(token: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted, cancelling");
        token.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
