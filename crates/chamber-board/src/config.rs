use std::time::Duration;

use chamber_frame::FrameConfig;
use chamber_transport::TransportConfig;

/// Default bound on the device handshake after a reset.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on receiving one telemetry record, on top of the
/// instruction's inter-sample wait.
pub const DEFAULT_OBSERVATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`crate::Board`] session.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Bound on receiving the chamber configuration and variable list.
    pub handshake_timeout: Duration,
    /// Per-record receive bound during a measurement.
    pub observation_timeout: Duration,
    /// Bound on command replies. `None` waits indefinitely.
    pub reply_timeout: Option<Duration>,
    pub transport: TransportConfig,
    pub frame: FrameConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            observation_timeout: DEFAULT_OBSERVATION_TIMEOUT,
            reply_timeout: None,
            transport: TransportConfig::default(),
            frame: FrameConfig::default(),
        }
    }
}

impl BoardConfig {
    /// Receive bound for one record of a measurement with `wait_ms` between
    /// samples.
    pub fn record_timeout(&self, wait_ms: u64) -> Duration {
        self.observation_timeout
            .saturating_add(Duration::from_millis(wait_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_timeout_extends_by_wait() {
        let config = BoardConfig::default();
        assert_eq!(config.record_timeout(0), Duration::from_secs(1));
        assert_eq!(config.record_timeout(250), Duration::from_millis(1250));
    }
}
