//! Capped exponential poll cadence for readiness checks.

use std::time::Duration;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MULTIPLIER: u32 = 2;

/// Delay schedule between readiness polls.
///
/// The first delay is `initial`; each following delay is multiplied by
/// `multiplier` until it reaches `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    initial: Duration,
    max: Duration,
    multiplier: u32,
}

impl PollSchedule {
    /// Create a schedule. A `multiplier` of zero is treated as one, and a
    /// `max` below `initial` is raised to `initial`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1),
        }
    }

    /// A fixed cadence with no growth.
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
            multiplier: 1,
        }
    }

    /// Return the first delay.
    #[must_use]
    pub const fn initial(&self) -> Duration {
        self.initial
    }

    /// Return the delay cap.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Iterate the delays of this schedule. The iterator never ends.
    #[must_use]
    pub const fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial,
            max: self.max,
            multiplier: self.multiplier,
        }
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER)
    }
}

/// Endless iterator over the delays of a [`PollSchedule`].
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.min(self.max);
        self.next = current.saturating_mul(self.multiplier).min(self.max);
        Some(current)
    }
}
