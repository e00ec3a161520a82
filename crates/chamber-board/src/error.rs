use std::time::Duration;

use chamber_serial::SerialError;
use chamber_transport::TransportError;

use crate::board::BoardState;
use crate::counter::CounterGap;

/// Errors that can occur in board sessions.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// Serial port error while opening or resetting the board.
    #[error("serial error: {0}")]
    Serial(#[from] SerialError),

    /// The board answered a command with something other than `OK`.
    #[error("board rejected {command:?}: replied {reply:?}")]
    Rejected { command: String, reply: String },

    /// An `OK` reply with the wrong content.
    #[error("unexpected reply {reply:?}, expected {expected:?}")]
    UnexpectedReply {
        expected: &'static str,
        reply: String,
    },

    /// A telemetry record of the wrong length.
    #[error("expected {expected} bytes ({variables} variables), got {received}")]
    UnexpectedPayloadSize {
        expected: usize,
        variables: usize,
        received: usize,
    },

    /// A lost or duplicated observation.
    #[error(transparent)]
    CounterGap(#[from] CounterGap),

    /// The board did not confirm the end of a measurement with `OK,DONE`.
    #[error("measurement not confirmed with OK,DONE: replied {reply:?}")]
    MissingCompletion { reply: String },

    /// The board did not announce itself in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The session cannot run the operation in its current state.
    #[error("cannot {operation} while board is {state}")]
    InvalidState {
        state: BoardState,
        operation: &'static str,
    },

    /// The observation sink failed.
    #[error("observation sink error: {0}")]
    Sink(#[source] std::io::Error),

    /// Operator confirmation failed.
    #[error("operator input error: {0}")]
    Operator(#[source] std::io::Error),

    /// The session was cancelled.
    #[error("board operation cancelled")]
    Cancelled,
}

impl From<TransportError> for BoardError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => BoardError::Cancelled,
            other => BoardError::Transport(other),
        }
    }
}

impl BoardError {
    /// Whether host and board have lost agreement on the session.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            BoardError::Rejected { .. }
                | BoardError::UnexpectedReply { .. }
                | BoardError::UnexpectedPayloadSize { .. }
                | BoardError::CounterGap(_)
                | BoardError::MissingCompletion { .. }
        )
    }

    /// Whether a time bound expired.
    pub fn is_timeout(&self) -> bool {
        match self {
            BoardError::HandshakeTimeout(_) => true,
            BoardError::Transport(err) => err.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BoardError>;
