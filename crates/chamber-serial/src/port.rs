use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort, SerialPortType};
use tracing::{debug, info, trace};

use crate::error::{Result, SerialError};
use crate::traits::{TimedRead, TimedWrite, MIN_TIMEOUT};

/// Default device path of the chamber control board.
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Default baud rate of the chamber control board.
pub const DEFAULT_BAUD_RATE: u32 = 500_000;

/// How long DTR is held low when resetting the board.
const RESET_PULSE: Duration = Duration::from_millis(50);

/// Settings used to open a [`SerialChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Device path (`/dev/ttyACM0`, `COM3`, ...).
    pub path: String,
    /// Line speed in baud.
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// An exclusively owned serial port with independent read and write timeouts.
///
/// The underlying driver keeps a single timeout for both directions; the
/// channel remembers both values and swaps the active one before each call.
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    name: String,
    read_timeout: Duration,
    write_timeout: Duration,
    applied: Duration,
}

impl SerialChannel {
    /// Open `path` at `baud_rate` with 8N1 framing and no flow control.
    pub fn open(path: impl Into<String>, baud_rate: u32) -> Result<Self> {
        Self::open_with(&SerialSettings {
            path: path.into(),
            baud_rate,
        })
    }

    /// Open a port from explicit settings.
    pub fn open_with(settings: &SerialSettings) -> Result<Self> {
        let initial = Duration::from_millis(100);
        let port = serialport::new(&settings.path, settings.baud_rate)
            .timeout(initial)
            .open()
            .map_err(|source| SerialError::Open {
                port: settings.path.clone(),
                source,
            })?;

        info!(port = %settings.path, baud = settings.baud_rate, "opened serial port");

        Ok(Self {
            port,
            name: settings.path.clone(),
            read_timeout: initial,
            write_timeout: initial,
            applied: initial,
        })
    }

    /// Clone the channel (a second handle on the same device).
    ///
    /// Used to hand one half to the frame reader and the other to the writer.
    pub fn try_clone(&self) -> Result<Self> {
        let port = self.port.try_clone()?;
        Ok(Self {
            port,
            name: self.name.clone(),
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            applied: self.applied,
        })
    }

    /// Discard any bytes pending in the input and output buffers.
    pub fn clear_buffers(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::All)?;
        debug!(port = %self.name, "cleared serial buffers");
        Ok(())
    }

    /// Reset the control board by toggling DTR low then high.
    pub fn pulse_reset(&mut self) -> Result<()> {
        self.port.write_data_terminal_ready(false)?;
        thread::sleep(RESET_PULSE);
        self.port.write_data_terminal_ready(true)?;
        info!(port = %self.name, "signalled board reset");
        Ok(())
    }

    /// Device path this channel was opened on.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn apply(&mut self, timeout: Duration) -> std::io::Result<()> {
        if self.applied != timeout {
            self.port.set_timeout(timeout)?;
            self.applied = timeout;
            trace!(port = %self.name, ?timeout, "changed serial timeout");
        }
        Ok(())
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.apply(self.read_timeout)?;
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.apply(self.write_timeout)?;
        self.port.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.apply(self.write_timeout)?;
        self.port.flush()
    }
}

impl TimedRead for SerialChannel {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.read_timeout = timeout.max(MIN_TIMEOUT);
        Ok(())
    }
}

impl TimedWrite for SerialChannel {
    fn set_write_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.write_timeout = timeout.max(MIN_TIMEOUT);
        Ok(())
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

/// A serial port visible on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path.
    pub name: String,
    /// Bus the port hangs off (`usb`, `bluetooth`, `pci`, `unknown`).
    pub kind: &'static str,
    /// Manufacturer/product string when the driver reports one.
    pub description: Option<String>,
}

/// Enumerate serial ports available on this host.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| {
            let (kind, description) = match port.port_type {
                SerialPortType::UsbPort(usb) => {
                    let description = match (usb.manufacturer, usb.product) {
                        (Some(m), Some(p)) => Some(format!("{m} {p}")),
                        (Some(m), None) => Some(m),
                        (None, Some(p)) => Some(p),
                        (None, None) => Some(format!("{:04x}:{:04x}", usb.vid, usb.pid)),
                    };
                    ("usb", description)
                }
                SerialPortType::BluetoothPort => ("bluetooth", None),
                SerialPortType::PciPort => ("pci", None),
                SerialPortType::Unknown => ("unknown", None),
            };
            PortInfo {
                name: port.port_name,
                kind,
                description,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_board_firmware() {
        let settings = SerialSettings::default();
        assert_eq!(settings.path, DEFAULT_PORT);
        assert_eq!(settings.baud_rate, 500_000);
    }

    #[test]
    fn open_missing_port_reports_path() {
        let err = SerialChannel::open("/dev/chamber-does-not-exist", 9600).unwrap_err();
        match err {
            SerialError::Open { port, .. } => assert_eq!(port, "/dev/chamber-does-not-exist"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
