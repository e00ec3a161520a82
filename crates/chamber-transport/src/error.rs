use std::time::Duration;

use chamber_frame::FrameError;

/// Errors surfaced by the transport layer.
///
/// Recoverable framing failures (timeouts, corrupt frames) never appear here;
/// they are counted and retried.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The message cannot fit a single frame once wrapped in a segment.
    #[error("payload too large ({len} bytes, max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// No message arrived within the receive timeout.
    #[error("no message received within {0:?}")]
    Timeout(Duration),

    /// The retry policy gave up before an acknowledgement arrived.
    #[error("segment not acknowledged after {attempts} attempts in {elapsed:?}")]
    RetriesExhausted { attempts: u32, elapsed: Duration },

    /// The operation was cancelled through the transport's token.
    #[error("transport operation cancelled")]
    Cancelled,

    /// Unrecoverable link failure (closed stream, I/O error, fatal stray bytes).
    #[error("link failure: {0}")]
    Link(#[source] FrameError),
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Cancelled => TransportError::Cancelled,
            other => TransportError::Link(other),
        }
    }
}

impl TransportError {
    /// Whether the failure came from a time bound (receive timeout or
    /// retry deadline/attempts).
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_) | TransportError::RetriesExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_cancellation_maps_to_cancelled() {
        let err = TransportError::from(FrameError::Cancelled);
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[test]
    fn other_frame_errors_are_link_failures() {
        let err = TransportError::from(FrameError::ConnectionClosed);
        assert!(matches!(err, TransportError::Link(FrameError::ConnectionClosed)));
        assert!(!err.is_timeout());
    }
}
