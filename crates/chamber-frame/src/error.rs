use std::time::Duration;

use bytes::Bytes;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The encoded frame would not fit the device's receive buffer.
    #[error("frame too large ({len} bytes, device buffer holds {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// The channel did not accept the frame within the write timeout.
    #[error("frame write timed out after {0:?}")]
    IoTimeout(Duration),

    /// No byte arrived within the receive timeout.
    #[error("frame reception timed out after {0:?}")]
    ReceiveTimeout(Duration),

    /// The frame body is not valid base64.
    #[error("malformed frame encoding: {0}")]
    MalformedEncoding(#[from] base64::DecodeError),

    /// A frame grew past the receive limit without an end delimiter.
    #[error("frame overrun ({len} bytes without end delimiter, max {max})")]
    Overrun { len: usize, max: usize },

    /// Bytes arrived outside of frame delimiters and policy says to fail.
    #[error("{count} unexpected bytes outside of frame delimiters: {preview:?}")]
    UnexpectedBytes { count: usize, preview: Bytes },

    /// The stream reached EOF.
    #[error("connection closed")]
    ConnectionClosed,

    /// A blocking receive was cancelled.
    #[error("frame reception cancelled")]
    Cancelled,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the failure only lost the current frame and the link is still
    /// usable. Recoverable errors are retried by the transport layer.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::IoTimeout(_)
                | FrameError::ReceiveTimeout(_)
                | FrameError::MalformedEncoding(_)
                | FrameError::Overrun { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
