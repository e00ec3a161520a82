use std::fmt;
use std::io;

use chamber_board::{BoardError, ProtocolError};
use chamber_frame::FrameError;
use chamber_serial::SerialError;
use chamber_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const CANCELLED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::UnexpectedEof => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn serial_error(context: &str, err: SerialError) -> CliError {
    match err {
        SerialError::Io(source) => io_error(context, source),
        SerialError::Open { ref source, .. } | SerialError::Port(ref source) => {
            let code = match source.kind() {
                serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => PERMISSION_DENIED,
                serialport::ErrorKind::NoDevice => FAILURE,
                _ => TRANSPORT_ERROR,
            };
            CliError::new(code, format!("{context}: {err}"))
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Cancelled => CliError::new(CANCELLED, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Link(err) => frame_error(context, err),
        TransportError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Cancelled => CliError::new(CANCELLED, format!("{context}: {err}")),
        TransportError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn board_error(context: &str, err: BoardError) -> CliError {
    if err.is_protocol_violation() {
        return CliError::new(DATA_INVALID, format!("{context}: {err}"));
    }
    match err {
        BoardError::Transport(err) => transport_error(context, err),
        BoardError::Serial(err) => serial_error(context, err),
        BoardError::Sink(source) | BoardError::Operator(source) => io_error(context, source),
        BoardError::HandshakeTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        BoardError::Cancelled => CliError::new(CANCELLED, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn protocol_error(err: ProtocolError) -> CliError {
    match err {
        ProtocolError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
            CliError::new(USAGE, format!("protocol not found: {source}"))
        }
        ProtocolError::Io { path, source } => {
            io_error(&format!("cannot read protocol {}", path.display()), source)
        }
        other => CliError::new(DATA_INVALID, format!("invalid protocol: {other}")),
    }
}
