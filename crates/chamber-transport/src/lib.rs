//! Reliable message delivery over the chamber serial link.
//!
//! A lightweight stop-and-wait ARQ on top of [`chamber_frame`]. Every message
//! travels in a [`Segment`] carrying:
//! - A flags byte (ACK, SYN)
//! - A 4-byte little-endian sequence number
//! - A 4-byte little-endian acknowledgement number
//! - The message bytes
//! - A CRC-32 over everything before it
//!
//! Corrupt or lost segments are retransmitted until acknowledged, duplicates
//! are re-acknowledged without being delivered twice.

pub mod config;
pub mod error;
pub mod segment;
pub mod stats;
pub mod transport;

pub use config::{RetryPolicy, TransportConfig, DEFAULT_ACK_TIMEOUT, FIRMWARE_SEQUENCE_ORIGIN};
pub use error::{Result, TransportError};
pub use segment::{Flags, Segment, SegmentError, SEGMENT_OVERHEAD};
pub use stats::TransportStats;
pub use transport::Transport;
