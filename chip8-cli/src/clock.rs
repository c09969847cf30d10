//! CPU Clock.
use std::{
    thread,
    time::{Duration, Instant},
};

use serde::Deserialize;

/// Number of nanoseconds in a second
const NANOS_IN_SECOND: u64 = 1_000_000_000;

/// CPU clock frequency, in hertz (per second)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Hz(pub u64);

impl Default for Hz {
    fn default() -> Self {
        Hz(500)
    }
}

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

/// Timer to synchronize the host loop with the cycle rate of the virtual CPU.
///
/// A zero interval turns the clock off, and the VM runs as fast as possible.
pub struct Clock {
    start: Instant,
    interval: Duration,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    pub fn new(frequency: Hz) -> Self {
        Self {
            start: Instant::now(),
            interval: frequency.into(),
        }
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.start = Instant::now()
    }

    /// Block the current thread until the next clock cycle.
    pub fn wait(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        while self.start.elapsed() < self.interval {
            // Sleep does not have enough resolution at high cycle rates.
            //
            // Spinning a loop causes high CPU usage and fan madness.
            //
            // Yielding in a loop is the best alternative.
            thread::yield_now();
        }

        // Reset back to zero, rather than trying to catch up.
        //
        // If the host was paused, it should simply continue
        // at the next cycle running at its usual speed.
        self.reset();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);

        let interval: Duration = Hz(0).into();
        assert!(interval.is_zero());
    }

    #[test]
    fn test_unthrottled_clock_does_not_block() {
        let mut clock = Clock::new(Hz(0));
        let start = Instant::now();
        for _ in 0..1000 {
            clock.wait();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
