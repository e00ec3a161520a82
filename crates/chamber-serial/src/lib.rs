//! Serial byte channel for chamber control boards.
//!
//! This is the lowest layer of the stack. It owns the physical serial port
//! and exposes it as plain `Read + Write` streams with per-operation timeouts
//! ([`TimedRead`] / [`TimedWrite`]). Everything above it only sees bytes.

pub mod error;
pub mod port;
pub mod traits;

pub use error::{Result, SerialError};
pub use port::{list_ports, PortInfo, SerialChannel, SerialSettings, DEFAULT_BAUD_RATE, DEFAULT_PORT};
pub use traits::{TimedRead, TimedWrite, MIN_TIMEOUT};
