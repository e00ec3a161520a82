use std::time::Duration;

/// Default bound on waiting for the acknowledgement of one transmission.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(100);

/// Sequence number the controller firmware starts both counters from. The
/// first segment of a session therefore carries `u32::MAX` and the second
/// wraps to `0`.
pub const FIRMWARE_SEQUENCE_ORIGIN: u32 = u32::MAX - 1;

/// Bounds on retransmitting an unacknowledged segment.
///
/// The default retries forever. Set a bound for unattended runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transmissions allowed, the first one included.
    pub max_attempts: Option<u32>,
    /// Wall-clock bound on one send, measured from the first transmission.
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Retry until acknowledged.
    pub fn forever() -> Self {
        Self::default()
    }

    /// Give up after `max_attempts` transmissions.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            deadline: None,
        }
    }

    /// Give up once `deadline` has passed since the first transmission.
    pub fn deadline(deadline: Duration) -> Self {
        Self {
            max_attempts: None,
            deadline: Some(deadline),
        }
    }

    /// Whether another transmission is allowed after `attempts` have failed
    /// over `elapsed`.
    pub fn allows_retry(&self, attempts: u32, elapsed: Duration) -> bool {
        let under_attempts = self.max_attempts.is_none_or(|max| attempts < max);
        let under_deadline = self.deadline.is_none_or(|limit| elapsed < limit);
        under_attempts && under_deadline
    }
}

/// Transport layer configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on waiting for an acknowledgement before retransmitting.
    pub ack_timeout: Duration,
    /// Bound on [`crate::Transport::receive`]. `None` blocks until a message
    /// arrives or the transport is cancelled.
    pub receive_timeout: Option<Duration>,
    /// Retransmission bounds for [`crate::Transport::send`].
    pub retry: RetryPolicy,
    /// Initial value of both `last_delivered` and `last_acknowledged`.
    pub sequence_origin: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            receive_timeout: None,
            retry: RetryPolicy::forever(),
            sequence_origin: FIRMWARE_SEQUENCE_ORIGIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forever_always_allows_retry() {
        let policy = RetryPolicy::forever();
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.deadline, None);
        assert!(policy.allows_retry(u32::MAX, Duration::from_secs(86_400)));
    }

    #[test]
    fn attempt_bound() {
        let policy = RetryPolicy::attempts(3);
        assert!(policy.allows_retry(1, Duration::ZERO));
        assert!(policy.allows_retry(2, Duration::ZERO));
        assert!(!policy.allows_retry(3, Duration::ZERO));
    }

    #[test]
    fn zero_attempts_still_transmits_once() {
        assert_eq!(RetryPolicy::attempts(0).max_attempts, Some(1));
    }

    #[test]
    fn deadline_bound() {
        let policy = RetryPolicy::deadline(Duration::from_millis(500));
        assert!(policy.allows_retry(100, Duration::from_millis(499)));
        assert!(!policy.allows_retry(1, Duration::from_millis(500)));
    }

    #[test]
    fn defaults_follow_firmware() {
        let config = TransportConfig::default();
        assert_eq!(config.ack_timeout, Duration::from_millis(100));
        assert_eq!(config.receive_timeout, None);
        assert_eq!(config.sequence_origin, 4_294_967_294);
        assert_eq!(config.retry, RetryPolicy::forever());
    }
}
