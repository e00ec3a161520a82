use std::fmt;

use serde::Serialize;

/// Sequence state and diagnostic counters of one transport session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    /// Sequence number of the last segment we sent and had acknowledged.
    pub last_delivered: u32,
    /// Sequence number of the last peer segment we acknowledged.
    pub last_acknowledged: u32,
    /// Segments that fit neither the expected nor the duplicate case.
    pub unexpected: u64,
    /// Acknowledgements re-sent for duplicate peer segments.
    pub ack_resends: u64,
    /// Data segments retransmitted.
    pub resends: u64,
    /// Incoming frames dropped for a bad checksum or encoding.
    pub failed_checksums: u64,
    /// Acknowledgement waits that timed out.
    pub ack_timeouts: u64,
    /// Frame writes that timed out.
    pub write_timeouts: u64,
}

impl fmt::Display for TransportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TRANSPORT LAYER STATE")?;
        writeln!(f, "---------------------")?;
        writeln!(f, "  last delivered sequence number = {}", self.last_delivered)?;
        writeln!(f, "  last acknowledged sequence number = {}", self.last_acknowledged)?;
        writeln!(f, "  unexpected segments = {}", self.unexpected)?;
        writeln!(f, "  resent ACK segments = {}", self.ack_resends)?;
        writeln!(f, "  resent (non-ACK) segments = {}", self.resends)?;
        writeln!(f, "  failed checksums = {}", self.failed_checksums)?;
        writeln!(f, "  ACK timeouts = {}", self.ack_timeouts)?;
        write!(f, "  write timeouts = {}", self.write_timeouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_every_counter() {
        let stats = TransportStats {
            last_delivered: 7,
            last_acknowledged: 9,
            resends: 2,
            ..TransportStats::default()
        };
        let text = stats.to_string();
        assert!(text.starts_with("TRANSPORT LAYER STATE\n"));
        assert!(text.contains("last delivered sequence number = 7"));
        assert!(text.contains("last acknowledged sequence number = 9"));
        assert!(text.contains("resent (non-ACK) segments = 2"));
        assert!(text.ends_with("write timeouts = 0"));
    }

    #[test]
    fn serializes_as_flat_object() {
        let json = serde_json::to_value(TransportStats::default()).unwrap();
        assert_eq!(json["ack_timeouts"], 0);
        assert_eq!(json.as_object().unwrap().len(), 8);
    }
}
