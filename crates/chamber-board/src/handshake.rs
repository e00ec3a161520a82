use std::io::Write;
use std::time::{Duration, Instant};

use chamber_serial::TimedRead;
use chamber_transport::{Transport, TransportError};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{BoardError, Result};
use crate::message::Reply;

/// What the board announces after a reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    /// Chamber configuration identity (`lt-standard`, `wt-standard`, ...).
    pub config: String,
    /// Variable names in record order. The first is the observation counter.
    pub variables: Vec<String>,
}

impl Schema {
    /// Byte length of one telemetry record.
    pub fn record_len(&self) -> usize {
        4 * self.variables.len()
    }

    /// Output columns: timestamp, config, then every variable.
    pub fn columns(&self) -> Vec<&str> {
        ["timestamp", "config"]
            .into_iter()
            .chain(self.variables.iter().map(String::as_str))
            .collect()
    }

    pub fn csv_header(&self) -> String {
        self.columns().join(",")
    }
}

/// Wait for `CHAMBER_CONFIG` then `VARIABLES_LIST`, skipping anything else.
pub(crate) fn perform_handshake<R: TimedRead, W: Write>(
    transport: &mut Transport<R, W>,
    timeout: Duration,
) -> Result<Schema> {
    let deadline = Instant::now() + timeout;

    let config = await_reply(transport, deadline, timeout, |reply| match reply {
        Reply::ChamberConfig(config) => Some(config),
        _ => None,
    })?;
    info!(%config, "received chamber config");

    let variables = await_reply(transport, deadline, timeout, |reply| match reply {
        Reply::VariablesList(names) => Some(names),
        _ => None,
    })?;
    info!(count = variables.len(), "received variable names");
    for (index, name) in variables.iter().enumerate() {
        debug!(index, %name, "device variable");
    }

    Ok(Schema { config, variables })
}

fn await_reply<R, W, T>(
    transport: &mut Transport<R, W>,
    deadline: Instant,
    timeout: Duration,
    mut want: impl FnMut(Reply) -> Option<T>,
) -> Result<T>
where
    R: TimedRead,
    W: Write,
{
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(BoardError::HandshakeTimeout(timeout));
        }
        let payload = match transport.receive_within(Some(remaining)) {
            Ok(payload) => payload,
            Err(TransportError::Timeout(_)) => return Err(BoardError::HandshakeTimeout(timeout)),
            Err(err) => return Err(err.into()),
        };
        match Reply::from_bytes(&payload) {
            Ok(reply) => match want(reply) {
                Some(value) => return Ok(value),
                None => debug!("skipping message during handshake"),
            },
            Err(err) => debug!(error = %err, "skipping noise during handshake"),
        }
    }
}
