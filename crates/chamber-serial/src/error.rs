/// Errors that can occur while opening or driving a serial channel.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// Failed to open the specified port.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    /// The serial driver rejected an operation on an open port.
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// An I/O error occurred on the channel.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
