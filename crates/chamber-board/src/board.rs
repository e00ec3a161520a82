use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Buf;
use chamber_serial::{SerialChannel, TimedRead, TimedWrite};
use chamber_transport::{Transport, TransportStats};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::config::BoardConfig;
use crate::counter::CounterTracker;
use crate::error::{BoardError, Result};
use crate::handshake::{perform_handshake, Schema};
use crate::message::{Instruction, InstructionKind, Reply};
use crate::observation::{Observation, ObservationSink};
use crate::operator::{Operator, StdinOperator};
use crate::protocol::Protocol;

/// Granularity at which local waits check for cancellation.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoardState {
    Disconnected,
    Handshaking,
    Ready,
    Executing(InstructionKind),
    /// A device-facing instruction failed; host and board may disagree.
    Failed,
    Closed,
}

impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardState::Disconnected => f.write_str("disconnected"),
            BoardState::Handshaking => f.write_str("handshaking"),
            BoardState::Ready => f.write_str("ready"),
            BoardState::Executing(kind) => write!(f, "executing {kind}"),
            BoardState::Failed => f.write_str("failed"),
            BoardState::Closed => f.write_str("closed"),
        }
    }
}

/// Totals of a protocol run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub instructions: usize,
    pub observations: u64,
    pub elapsed: Duration,
}

/// A session with one chamber control board.
///
/// Owns the link exclusively and runs one instruction at a time. After a
/// device-facing instruction fails the session refuses further instructions.
pub struct Board<R, W> {
    transport: Transport<R, W>,
    config: BoardConfig,
    schema: Schema,
    state: BoardState,
    counter: CounterTracker,
    sink: Option<Box<dyn ObservationSink>>,
    operator: Box<dyn Operator>,
}

impl Board<SerialChannel, SerialChannel> {
    /// Clear the port, reset the board and wait for it to announce itself.
    pub fn open(mut channel: SerialChannel, config: BoardConfig) -> Result<Self> {
        channel.clear_buffers()?;
        channel.pulse_reset()?;
        info!(port = %channel.name(), "waiting for chamber to come online");

        let reader = channel.try_clone()?;
        let transport = Transport::open(
            reader,
            channel,
            config.frame.clone(),
            config.transport.clone(),
        )?;
        Self::connect(transport, config)
    }
}

impl<R: TimedRead, W: TimedWrite> Board<R, W> {
    /// Handshake over already-connected streams, without a hardware reset.
    pub fn from_streams(reader: R, writer: W, config: BoardConfig) -> Result<Self> {
        let transport = Transport::open(
            reader,
            writer,
            config.frame.clone(),
            config.transport.clone(),
        )?;
        Self::connect(transport, config)
    }
}

impl<R: TimedRead, W: Write> Board<R, W> {
    /// Run the handshake on `transport` and return a ready session.
    pub fn connect(transport: Transport<R, W>, config: BoardConfig) -> Result<Self> {
        let mut board = Self {
            transport,
            config,
            schema: Schema::default(),
            state: BoardState::Disconnected,
            counter: CounterTracker::new(),
            sink: None,
            operator: Box::new(StdinOperator),
        };

        board.state = BoardState::Handshaking;
        board.schema = perform_handshake(&mut board.transport, board.config.handshake_timeout)?;
        board.state = BoardState::Ready;
        Ok(board)
    }

    /// Send every observation to `sink` as it arrives.
    pub fn with_sink(mut self, sink: impl ObservationSink + 'static) -> Result<Self> {
        self.set_sink(Box::new(sink))?;
        Ok(self)
    }

    /// Replace the observation sink. The sink receives the session schema
    /// immediately.
    pub fn set_sink(&mut self, mut sink: Box<dyn ObservationSink>) -> Result<()> {
        sink.begin(&self.schema).map_err(BoardError::Sink)?;
        self.sink = Some(sink);
        Ok(())
    }

    /// Confirm `WAIT_INPUT` instructions through `operator`.
    pub fn with_operator(mut self, operator: impl Operator + 'static) -> Self {
        self.operator = Box::new(operator);
        self
    }

    /// Execute one instruction. Measurements return their observations.
    pub fn execute(&mut self, instruction: &Instruction) -> Result<Vec<Observation>> {
        debug!(%instruction, "executing instruction");
        match instruction {
            Instruction::Set { target, value } => self.set(target, value).map(|()| Vec::new()),
            Instruction::Wait { millis } => self
                .wait(Duration::from_millis(*millis))
                .map(|()| Vec::new()),
            Instruction::WaitInput { prompt } => self.wait_input(prompt).map(|()| Vec::new()),
            Instruction::Measure { count, wait_ms } => self.measure(*count, *wait_ms),
            Instruction::Reset => self.reset().map(|()| Vec::new()),
        }
    }

    /// Set `target` to `value` on the board.
    pub fn set(&mut self, target: &str, value: &str) -> Result<()> {
        self.device_step(InstructionKind::Set, |board| {
            board.command(&format!("SET,{target},{value}"))?;
            Ok(())
        })
    }

    /// Reset the board.
    pub fn reset(&mut self) -> Result<()> {
        self.device_step(InstructionKind::Reset, |board| {
            board.command("RST")?;
            Ok(())
        })
    }

    /// Take `count` measurements `wait_ms` apart.
    pub fn measure(&mut self, count: u32, wait_ms: u64) -> Result<Vec<Observation>> {
        self.device_step(InstructionKind::Measure, |board| {
            board.run_measurement(count, wait_ms)
        })
    }

    /// Pause locally for `duration`.
    pub fn wait(&mut self, duration: Duration) -> Result<()> {
        self.ensure_ready(InstructionKind::Wait)?;
        debug!(seconds = duration.as_secs_f64(), "waiting");

        let token = self.transport.cancellation_token();
        let until = Instant::now() + duration;
        loop {
            if token.is_cancelled() {
                return Err(BoardError::Cancelled);
            }
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            thread::sleep(left.min(WAIT_SLICE));
        }
    }

    /// Block until the operator confirms `prompt`.
    pub fn wait_input(&mut self, prompt: &str) -> Result<()> {
        self.ensure_ready(InstructionKind::WaitInput)?;
        self.operator.confirm(prompt).map_err(BoardError::Operator)
    }

    /// Execute every instruction of `protocol` in order.
    pub fn run_protocol(&mut self, protocol: &Protocol) -> Result<RunSummary> {
        let started = Instant::now();
        let token = self.transport.cancellation_token();
        let mut summary = RunSummary::default();

        for (index, step) in protocol.steps().iter().enumerate() {
            if token.is_cancelled() {
                return Err(BoardError::Cancelled);
            }
            info!(
                line = step.line,
                step = index + 1,
                total = protocol.len(),
                instruction = %step.instruction,
                "executing instruction"
            );
            match self.execute(&step.instruction) {
                Ok(observations) => {
                    summary.instructions += 1;
                    summary.observations += observations.len() as u64;
                }
                Err(err) => {
                    error!(line = step.line, error = %err, "instruction failed");
                    return Err(err);
                }
            }
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Device announcement captured during the handshake.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    /// Transport counters for this session.
    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Last accepted observation counter.
    pub fn last_counter(&self) -> f32 {
        self.counter.last()
    }

    /// Token that cancels blocking operations of this session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.transport.cancellation_token()
    }

    /// Raw message access, bypassing instruction checks.
    pub fn transport_mut(&mut self) -> &mut Transport<R, W> {
        &mut self.transport
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// End the session and release the link.
    pub fn close(mut self) -> Result<()> {
        if self.state != BoardState::Ready {
            return Err(BoardError::InvalidState {
                state: self.state,
                operation: "close",
            });
        }
        self.state = BoardState::Closed;
        info!(stats = ?self.transport.stats(), "closed board session");
        Ok(())
    }

    fn ensure_ready(&self, kind: InstructionKind) -> Result<()> {
        if self.state == BoardState::Ready {
            return Ok(());
        }
        Err(BoardError::InvalidState {
            state: self.state,
            operation: operation_name(kind),
        })
    }

    /// Run a device-facing step, failing the session if it fails.
    fn device_step<T>(
        &mut self,
        kind: InstructionKind,
        step: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.ensure_ready(kind)?;
        self.state = BoardState::Executing(kind);
        match step(self) {
            Ok(value) => {
                self.state = BoardState::Ready;
                Ok(value)
            }
            Err(err) => {
                self.state = BoardState::Failed;
                Err(err)
            }
        }
    }

    /// Send a command and require an `OK` reply.
    fn command(&mut self, command: &str) -> Result<Reply> {
        self.transport.send(command.as_bytes())?;
        debug!(command, "sent command");

        let payload = self.transport.receive_within(self.config.reply_timeout)?;
        match Reply::from_bytes(&payload) {
            Ok(reply @ Reply::Ok { .. }) => {
                debug!(%reply, "received reply");
                Ok(reply)
            }
            _ => Err(BoardError::Rejected {
                command: command.to_string(),
                reply: String::from_utf8_lossy(&payload).into_owned(),
            }),
        }
    }

    fn run_measurement(&mut self, count: u32, wait_ms: u64) -> Result<Vec<Observation>> {
        let command = Instruction::Measure { count, wait_ms }.to_string();
        let reply = self.command(&command)?;
        if !reply.is_ok_with("MSR") {
            return Err(BoardError::UnexpectedReply {
                expected: "OK,MSR",
                reply: reply.to_string(),
            });
        }

        let timeout = self.config.record_timeout(wait_ms);
        let expected = self.schema.record_len();
        let mut observations = Vec::with_capacity(count.min(4096) as usize);

        for received in 1..=count {
            let record = self.transport.receive_within(Some(timeout))?;
            if record.len() != expected || expected == 0 {
                return Err(BoardError::UnexpectedPayloadSize {
                    expected,
                    variables: self.schema.variables.len(),
                    received: record.len(),
                });
            }

            let mut buf = &record[..];
            let counter = buf.get_f32_le();
            let mut values = Vec::with_capacity(buf.remaining() / 4);
            while buf.has_remaining() {
                values.push(buf.get_f32_le());
            }
            self.counter.accept(counter)?;

            let observation = Observation::now(&self.schema.config, counter, values);
            if let Some(sink) = self.sink.as_mut() {
                sink.accept(&observation).map_err(BoardError::Sink)?;
            }
            trace!(received, count, counter, "received observation");
            observations.push(observation);
        }

        let payload = self.transport.receive_within(self.config.reply_timeout)?;
        match Reply::from_bytes(&payload) {
            Ok(reply) if reply.is_ok_with("DONE") => {
                debug!(count, "measurement complete");
                Ok(observations)
            }
            _ => Err(BoardError::MissingCompletion {
                reply: String::from_utf8_lossy(&payload).into_owned(),
            }),
        }
    }
}

fn operation_name(kind: InstructionKind) -> &'static str {
    match kind {
        InstructionKind::Set => "execute SET",
        InstructionKind::Wait => "execute WAIT",
        InstructionKind::WaitInput => "execute WAIT_INPUT",
        InstructionKind::Measure => "execute MSR",
        InstructionKind::Reset => "execute RST",
    }
}
