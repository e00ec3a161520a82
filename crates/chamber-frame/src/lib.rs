//! Delimited frame codec for the chamber serial link.
//!
//! Every message on the wire is framed as:
//! - A `0x00` start delimiter
//! - The standard base64 encoding of the payload
//! - A `0x04` end delimiter
//!
//! The base64 alphabet never contains either delimiter, so a receiver can
//! resynchronize on any byte boundary. Frames are bounded by the control
//! board's 64-byte input buffer.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_body, encode_frame, encoded_len, max_payload_len, DiscardPolicy, FrameConfig,
    DEFAULT_MAX_RECEIVE, DEFAULT_POLL_INTERVAL, DEFAULT_WRITE_TIMEOUT, DEVICE_BUFFER_SIZE,
    END_BYTE, START_BYTE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
