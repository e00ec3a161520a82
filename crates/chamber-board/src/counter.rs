/// Counter value after which the board restarts its observation counter at 0.
///
/// This is a firmware constant, not the range limit of the `f32` counter.
pub const MAX_COUNTER: f32 = 100_000.0;

/// Previous counter before the first observation after power-up.
pub const INITIAL_COUNTER: f32 = -1.0;

/// A counter value that does not follow the previous observation.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("expected observation counter {expected}, got {received}")]
pub struct CounterGap {
    pub expected: f32,
    pub received: f32,
}

/// Checks that observation counters advance by exactly one.
///
/// Lives for the whole session, across measurement instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterTracker {
    last: f32,
}

impl Default for CounterTracker {
    fn default() -> Self {
        Self {
            last: INITIAL_COUNTER,
        }
    }
}

impl CounterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after a known previous counter.
    pub fn resume_from(last: f32) -> Self {
        Self { last }
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    /// The only counter value [`CounterTracker::accept`] takes next.
    pub fn expected(&self) -> f32 {
        if self.last < MAX_COUNTER {
            self.last + 1.0
        } else {
            0.0
        }
    }

    /// Accept `counter` if it is the expected next value.
    pub fn accept(&mut self, counter: f32) -> Result<(), CounterGap> {
        let expected = self.expected();
        if counter != expected {
            return Err(CounterGap {
                expected,
                received: counter,
            });
        }
        self.last = counter;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_counter_is_zero() {
        let mut tracker = CounterTracker::new();
        assert_eq!(tracker.expected(), 0.0);
        tracker.accept(0.0).unwrap();
        tracker.accept(1.0).unwrap();
        assert_eq!(tracker.last(), 1.0);
    }

    #[test]
    fn skipped_counter_is_a_gap() {
        let mut tracker = CounterTracker::resume_from(4.0);
        tracker.accept(5.0).unwrap();
        let gap = tracker.accept(7.0).unwrap_err();
        assert_eq!(
            gap,
            CounterGap {
                expected: 6.0,
                received: 7.0
            }
        );
        assert_eq!(tracker.last(), 5.0);
    }

    #[test]
    fn repeated_counter_is_a_gap() {
        let mut tracker = CounterTracker::resume_from(9.0);
        assert!(tracker.accept(9.0).is_err());
    }

    #[test]
    fn wraps_after_firmware_maximum() {
        let mut tracker = CounterTracker::resume_from(MAX_COUNTER - 1.0);
        tracker.accept(MAX_COUNTER).unwrap();
        tracker.accept(0.0).unwrap();
        tracker.accept(1.0).unwrap();
    }

    #[test]
    fn no_wrap_before_maximum() {
        let mut tracker = CounterTracker::resume_from(MAX_COUNTER - 1.0);
        assert!(tracker.accept(0.0).is_err());
    }

    #[test]
    fn maximum_must_wrap() {
        let mut tracker = CounterTracker::resume_from(MAX_COUNTER);
        assert!(tracker.accept(MAX_COUNTER + 1.0).is_err());
    }
}
