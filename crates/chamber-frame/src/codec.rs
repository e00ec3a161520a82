use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Marks the start of a frame. Never produced by the base64 alphabet.
pub const START_BYTE: u8 = 0x00;

/// Marks the end of a frame. Never produced by the base64 alphabet.
pub const END_BYTE: u8 = 0x04;

/// Size of the control board's serial input buffer, delimiters included.
pub const DEVICE_BUFFER_SIZE: usize = 64;

/// Default upper bound on an incoming frame body: 16 KiB.
pub const DEFAULT_MAX_RECEIVE: usize = 16 * 1024;

/// Default bound on a single frame write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Default granularity at which blocking receives recheck deadlines and
/// cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What to do with bytes that arrive outside of a start/end delimiter pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiscardPolicy {
    /// Drop them silently.
    Ignore,
    /// Drop them and log a warning.
    #[default]
    Warn,
    /// Fail the receive with [`FrameError::UnexpectedBytes`].
    Fail,
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest frame (delimiters included) the writer may emit.
    pub max_frame_len: usize,
    /// Largest frame body the reader accepts before giving up on it.
    pub max_receive_len: usize,
    /// Bound on each blocking write.
    pub write_timeout: Duration,
    /// Poll granularity for blocking reads.
    pub poll_interval: Duration,
    /// Handling of stray bytes between frames.
    pub discarded: DiscardPolicy,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEVICE_BUFFER_SIZE,
            max_receive_len: DEFAULT_MAX_RECEIVE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            discarded: DiscardPolicy::default(),
        }
    }
}

/// Wire size of a frame carrying `payload_len` bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    4 * payload_len.div_ceil(3) + 2
}

/// Largest payload that fits a frame of at most `max_frame_len` bytes.
pub fn max_payload_len(max_frame_len: usize) -> usize {
    (max_frame_len.saturating_sub(2) / 4) * 3
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────────────────────┬──────────┐
/// │ 0x00 start │ base64(payload)      │ 0x04 end │
/// └────────────┴──────────────────────┴──────────┘
/// ```
///
/// The size bound is checked before anything is appended to `dst`.
pub fn encode_frame(payload: &[u8], max_frame_len: usize, dst: &mut BytesMut) -> Result<()> {
    let len = encoded_len(payload.len());
    if len > max_frame_len {
        return Err(FrameError::FrameTooLarge {
            len,
            max: max_frame_len,
        });
    }
    dst.reserve(len);
    dst.put_u8(START_BYTE);
    dst.put_slice(STANDARD.encode(payload).as_bytes());
    dst.put_u8(END_BYTE);
    Ok(())
}

/// Decode the bytes found between the delimiters of a frame.
pub fn decode_body(body: &[u8]) -> Result<Bytes> {
    Ok(Bytes::from(STANDARD.decode(body)?))
}
