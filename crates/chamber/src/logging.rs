use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Environment variable holding a filter directive that overrides `--log-level`.
pub const LOG_ENV: &str = "CHAMBER_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn build_filter(level: LogLevel, env: Option<&str>) -> EnvFilter {
    env.map(str::trim)
        .filter(|spec| !spec.is_empty())
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_directive()))
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber: `format` on stderr and, when `file` is
/// given, plain text appended to that file. Both share one level filter.
pub fn init_logging(format: LogFormat, level: LogLevel, file: Option<&Path>) -> io::Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let log_file = file.map(open_log_file).transpose()?;

    let stderr_layer = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(false)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
    };
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .boxed()
    });

    let _ = tracing_subscriber::registry()
        .with(build_filter(level, env.as_deref()))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directive_overrides_level() {
        let filter = build_filter(LogLevel::Info, Some("chamber_transport=trace"));
        assert_eq!(filter.to_string(), "chamber_transport=trace");
    }

    #[test]
    fn blank_env_falls_back_to_level() {
        assert_eq!(build_filter(LogLevel::Warn, Some("  ")).to_string(), "warn");
        assert_eq!(build_filter(LogLevel::Debug, None).to_string(), "debug");
    }

    #[test]
    fn log_file_in_missing_directory_fails() {
        let err = open_log_file(Path::new("/nonexistent/chamber/run.log")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
