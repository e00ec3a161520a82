//! Session layer for chamber control boards.
//!
//! A [`Board`] owns one serial link to a controller. After a reset the
//! controller announces its configuration and variable list; the session
//! then executes instructions one at a time:
//!
//! - `SET,<variable>,<value>` and `RST` expect an `OK` reply
//! - `MSR,<n>,<wait_ms>` expects `OK,MSR`, `n` binary records, then `OK,DONE`
//! - `WAIT,<ms>` and `WAIT_INPUT,<prompt>` run on the host only
//!
//! Every record starts with an observation counter that must advance by one.
//! A gap, a malformed reply or a rejected command fails the session.

pub mod board;
pub mod config;
pub mod counter;
pub mod error;
pub mod handshake;
pub mod message;
pub mod observation;
pub mod operator;
pub mod protocol;

pub use board::{Board, BoardState, RunSummary};
pub use config::{BoardConfig, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_OBSERVATION_TIMEOUT};
pub use counter::{CounterGap, CounterTracker, INITIAL_COUNTER, MAX_COUNTER};
pub use error::{BoardError, Result};
pub use handshake::Schema;
pub use message::{Instruction, InstructionKind, Message, Reply, UnrecognizedMessage};
pub use observation::{CsvSink, Observation, ObservationSink};
pub use operator::{Operator, StdinOperator};
pub use protocol::{Protocol, ProtocolError, Step};
