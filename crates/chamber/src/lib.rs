//! Host-side control of causal chamber boards.
//!
//! The chamber controller talks over a serial link using a small layered
//! protocol. Each layer lives in its own crate and is re-exported here:
//!
//! - [`serial`]: serial port access with per-operation timeouts
//! - [`frame`]: delimited base64 frames sized for the controller's buffer
//! - [`transport`]: stop-and-wait delivery with checksums and retransmission
//! - [`board`]: handshake, instructions, telemetry and experiment protocols

/// Re-export serial channel types.
pub mod serial {
    pub use chamber_serial::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chamber_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use chamber_transport::*;
}

/// Re-export session types.
pub mod board {
    pub use chamber_board::*;
}
