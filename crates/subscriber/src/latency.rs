//! Monotonic TSC clock for ack latency measurement.

use std::time::Duration;

use once_cell::sync::Lazy;
use quanta::Clock;

/// Global TSC clock - calibrated once, cloned into each message
pub static CLOCK: Lazy<Clock> = Lazy::new(Clock::new);

/// Whole seconds, rounded up.
#[inline]
pub fn ceil_secs(elapsed: Duration) -> u64 {
    elapsed.as_secs() + u64::from(elapsed.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_secs_rounds_up() {
        assert_eq!(ceil_secs(Duration::ZERO), 0);
        assert_eq!(ceil_secs(Duration::from_nanos(1)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(999)), 1);
        assert_eq!(ceil_secs(Duration::from_secs(1)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(2001)), 3);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let t1 = CLOCK.now();
        let t2 = CLOCK.now();
        assert!(t2 >= t1, "TSC should be monotonic");
    }
}
