use std::io::Write;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chamber_frame::{max_payload_len, FrameConfig, FrameError, FrameReader, FrameWriter};
use chamber_serial::{TimedRead, TimedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::segment::{Segment, SEGMENT_OVERHEAD};
use crate::stats::TransportStats;

/// Outcome of waiting for one incoming segment.
enum Incoming {
    Segment(Segment),
    Timeout,
    Corrupt,
}

/// Reliable, ordered, stop-and-wait message channel over a framed byte link.
///
/// At most one send and one receive are outstanding at any time. Both sides
/// of a link run the same state machine, so a device simulator is just
/// another `Transport`.
pub struct Transport<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    config: TransportConfig,
    last_delivered: u32,
    last_acknowledged: u32,
    stats: TransportStats,
    cancel: CancellationToken,
}

impl<R: TimedRead, W: TimedWrite> Transport<R, W> {
    /// Build a transport over separate read and write halves of one link.
    pub fn open(reader: R, writer: W, frame: FrameConfig, config: TransportConfig) -> Result<Self> {
        let writer = FrameWriter::with_config_timed(writer, frame.clone())?;
        let reader = FrameReader::with_config(reader, frame);
        Ok(Self::from_parts(reader, writer, config))
    }
}

impl<R: TimedRead, W: Write> Transport<R, W> {
    /// Build a transport over an existing frame reader and writer.
    pub fn from_parts(
        mut reader: FrameReader<R>,
        writer: FrameWriter<W>,
        config: TransportConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        reader.set_cancellation(cancel.clone());
        let origin = config.sequence_origin;
        Self {
            reader,
            writer,
            config,
            last_delivered: origin,
            last_acknowledged: origin,
            stats: TransportStats {
                last_delivered: origin,
                last_acknowledged: origin,
                ..TransportStats::default()
            },
            cancel,
        }
    }

    /// Largest message a single [`Transport::send`] accepts.
    pub fn max_message_len(&self) -> usize {
        max_payload_len(self.writer.config().max_frame_len).saturating_sub(SEGMENT_OVERHEAD)
    }

    /// Deliver `payload` to the peer, retransmitting until acknowledged or
    /// until the retry policy gives up.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let max = self.max_message_len();
        if payload.len() > max {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        let segment = Segment::data(
            self.last_delivered.wrapping_add(1),
            Bytes::copy_from_slice(payload),
        );
        let encoded = segment.encode();
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            if attempts > 0 {
                let elapsed = started.elapsed();
                if !self.config.retry.allows_retry(attempts, elapsed) {
                    warn!(seq = segment.seq, attempts, ?elapsed, "giving up on segment");
                    return Err(TransportError::RetriesExhausted { attempts, elapsed });
                }
                self.stats.resends += 1;
            }
            attempts += 1;

            self.write_segment(&encoded)?;
            debug!(%segment, attempts, "sent segment");

            let wait = match self.config.retry.deadline {
                Some(limit) => self
                    .config
                    .ack_timeout
                    .min(limit.saturating_sub(started.elapsed())),
                None => self.config.ack_timeout,
            };
            match self.next_segment(Some(wait))? {
                Incoming::Corrupt => self.stats.failed_checksums += 1,
                Incoming::Timeout => {
                    debug!(seq = segment.seq, "ACK reception timed out");
                    self.stats.ack_timeouts += 1;
                }
                Incoming::Segment(reply) if reply.is_ack() && reply.ack_number == segment.seq => {
                    self.last_delivered = segment.seq;
                    self.sync_stats();
                    return Ok(());
                }
                Incoming::Segment(reply)
                    if !reply.is_ack() && reply.seq == self.last_acknowledged =>
                {
                    // The peer never saw our last ACK and is still repeating.
                    self.send_ack(self.last_acknowledged)?;
                    self.stats.ack_resends += 1;
                }
                Incoming::Segment(reply) => {
                    warn!(%reply, "unexpected segment while awaiting ACK");
                    self.stats.unexpected += 1;
                }
            }
        }
    }

    /// Wait for the next message from the peer, bounded by the configured
    /// receive timeout.
    pub fn receive(&mut self) -> Result<Bytes> {
        self.receive_within(self.config.receive_timeout)
    }

    /// Wait for the next message from the peer for at most `timeout`
    /// (`None` waits indefinitely).
    pub fn receive_within(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        let deadline = timeout.map(|t| (t, Instant::now() + t));

        loop {
            let remaining = match deadline {
                Some((limit, at)) => {
                    let left = at.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(TransportError::Timeout(limit));
                    }
                    Some(left)
                }
                None => None,
            };

            match self.next_segment(remaining)? {
                Incoming::Corrupt => self.stats.failed_checksums += 1,
                Incoming::Timeout => {
                    let limit = timeout.unwrap_or_default();
                    return Err(TransportError::Timeout(limit));
                }
                Incoming::Segment(segment)
                    if !segment.is_ack()
                        && segment.seq == self.last_acknowledged.wrapping_add(1) =>
                {
                    self.send_ack(segment.seq)?;
                    self.last_acknowledged = segment.seq;
                    self.sync_stats();
                    return Ok(segment.data);
                }
                Incoming::Segment(segment)
                    if !segment.is_ack() && segment.seq == self.last_acknowledged =>
                {
                    debug!(seq = segment.seq, "duplicate segment, resending ACK");
                    self.send_ack(segment.seq)?;
                    self.stats.ack_resends += 1;
                }
                Incoming::Segment(segment) => {
                    warn!(%segment, "unexpected segment");
                    self.stats.unexpected += 1;
                }
            }
        }
    }

    fn next_segment(&mut self, timeout: Option<Duration>) -> Result<Incoming> {
        let frame = match self.reader.read_frame(timeout) {
            Ok(frame) => frame,
            Err(FrameError::ReceiveTimeout(_)) => return Ok(Incoming::Timeout),
            Err(err) if err.is_recoverable() => {
                debug!(error = %err, "dropping corrupt frame");
                return Ok(Incoming::Corrupt);
            }
            Err(err) => return Err(err.into()),
        };

        match Segment::decode(&frame) {
            Ok(segment) => {
                debug!(%segment, "received segment");
                Ok(Incoming::Segment(segment))
            }
            Err(err) => {
                debug!(error = %err, "dropping segment");
                Ok(Incoming::Corrupt)
            }
        }
    }

    fn send_ack(&mut self, ack_number: u32) -> Result<()> {
        let ack = Segment::ack(self.last_delivered, ack_number);
        self.write_segment(&ack.encode())?;
        debug!(segment = %ack, "sent ACK");
        Ok(())
    }

    /// A timed-out write counts as a lost frame; the ARQ loop recovers it.
    fn write_segment(&mut self, encoded: &[u8]) -> Result<()> {
        match self.writer.send(encoded) {
            Ok(()) => Ok(()),
            Err(FrameError::IoTimeout(timeout)) => {
                warn!(?timeout, "frame write timed out");
                self.stats.write_timeouts += 1;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn sync_stats(&mut self) {
        self.stats.last_delivered = self.last_delivered;
        self.stats.last_acknowledged = self.last_acknowledged;
    }

    /// Snapshot of the sequence state and counters.
    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Sequence number of the last segment sent and acknowledged.
    pub fn last_delivered(&self) -> u32 {
        self.last_delivered
    }

    /// Sequence number of the last peer segment acknowledged.
    pub fn last_acknowledged(&self) -> u32 {
        self.last_acknowledged
    }

    /// Token that cancels blocking sends and receives on this transport.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Release the frame reader and writer.
    pub fn into_parts(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}
