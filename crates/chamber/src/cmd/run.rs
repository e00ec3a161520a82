use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chamber_board::{CsvSink, ObservationSink, Protocol};
use chrono::{Local, NaiveDateTime};

use crate::cmd::{install_ctrlc_handler, RunArgs};
use crate::exit::{board_error, io_error, protocol_error, CliResult, SUCCESS};
use crate::output::{print_stats, OutputFormat};

/// Timestamp layout used in default output file names.
const STAMP_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

/// Where the observations of one run are written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    fn resolve(args: &RunArgs, now: NaiveDateTime) -> Self {
        match args.output.as_deref() {
            Some(path) if path == Path::new("-") => Destination::Stdout,
            Some(path) => Destination::File(path.to_path_buf()),
            None => Destination::File(default_output_path(&args.output_dir, &args.protocol, now)),
        }
    }
}

/// `<dir>/<protocol stem>_<timestamp>.csv`.
fn default_output_path(dir: &Path, protocol: &Path, now: NaiveDateTime) -> PathBuf {
    let stem = protocol
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "protocol".to_string());
    dir.join(format!("{stem}_{}.csv", now.format(STAMP_FORMAT)))
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let protocol = Protocol::load(&args.protocol).map_err(protocol_error)?;
    tracing::info!(
        protocol = %args.protocol.display(),
        instructions = protocol.len(),
        observations = protocol.expected_observations(),
        "loaded protocol"
    );

    let destination = Destination::resolve(&args, Local::now().naive_local());
    let mut board = args.link.open_board()?;
    install_ctrlc_handler(board.cancellation_token())?;
    protocol
        .validate(&board.schema().variables)
        .map_err(protocol_error)?;

    board
        .set_sink(open_sink(&destination)?)
        .map_err(|err| board_error("cannot write output", err))?;

    let summary = match board.run_protocol(&protocol) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("{}", board.stats());
            return Err(board_error("run failed", err));
        }
    };

    board
        .reset()
        .map_err(|err| board_error("final reset failed", err))?;
    board
        .wait(args.reset_delay)
        .map_err(|err| board_error("final reset failed", err))?;

    tracing::info!(
        instructions = summary.instructions,
        observations = summary.observations,
        seconds = summary.elapsed.as_secs_f64(),
        "protocol complete"
    );

    // Stdout carries the CSV when no output file is used.
    match destination {
        Destination::File(_) => print_stats(&board.stats(), Some(&summary), format),
        Destination::Stdout => eprintln!("{}", board.stats()),
    }

    board
        .close()
        .map_err(|err| board_error("close failed", err))?;
    Ok(SUCCESS)
}

fn open_sink(destination: &Destination) -> CliResult<Box<dyn ObservationSink>> {
    match destination {
        Destination::File(path) => {
            let file = File::create(path).map_err(|err| {
                io_error(&format!("cannot create {}", path.display()), err)
            })?;
            tracing::info!(path = %path.display(), "saving observations");
            Ok(Box::new(CsvSink::new(BufWriter::new(file))))
        }
        Destination::Stdout => Ok(Box::new(CsvSink::new(io::stdout()))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::cmd::{DiscardArg, LinkArgs};

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap()
    }

    fn run_args(output: Option<&str>) -> RunArgs {
        RunArgs {
            protocol: PathBuf::from("protocols/calibration.txt"),
            output: output.map(PathBuf::from),
            output_dir: PathBuf::from("/data/runs"),
            reset_delay: Duration::from_secs(4),
            link: LinkArgs {
                port: "/dev/ttyUSB0".into(),
                baud: 500_000,
                ack_timeout: Duration::from_millis(100),
                max_attempts: None,
                send_deadline: None,
                handshake_timeout: Duration::from_secs(10),
                observation_timeout: Duration::from_secs(1),
                discarded: DiscardArg::Warn,
            },
        }
    }

    #[test]
    fn default_output_named_after_protocol_and_time() {
        assert_eq!(
            Destination::resolve(&run_args(None), noon()),
            Destination::File(PathBuf::from(
                "/data/runs/calibration_2024_03_05-14_07_09.csv"
            ))
        );
    }

    #[test]
    fn explicit_output_and_stdout() {
        assert_eq!(
            Destination::resolve(&run_args(Some("out.csv")), noon()),
            Destination::File(PathBuf::from("out.csv"))
        );
        assert_eq!(
            Destination::resolve(&run_args(Some("-")), noon()),
            Destination::Stdout
        );
    }

    #[test]
    fn stemless_protocol_still_gets_a_name() {
        let path = default_output_path(Path::new("."), Path::new("/"), noon());
        assert_eq!(path, PathBuf::from("./protocol_2024_03_05-14_07_09.csv"));
    }

    #[test]
    fn sink_file_in_missing_directory_fails() {
        let destination = Destination::File(PathBuf::from("/nonexistent/chamber/out.csv"));
        let err = open_sink(&destination).err().unwrap();
        assert_eq!(err.code, crate::exit::FAILURE);
        assert!(err.message.contains("/nonexistent/chamber/out.csv"));
    }
}
