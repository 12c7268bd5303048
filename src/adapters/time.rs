//! Monotonic trial clock.
//!
//! Trial time is a [`Duration`] since the clock was last restarted.  Backed
//! by `std::time::Instant`, so it never goes backwards.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Make "now" time zero.
    pub fn restart(&mut self) {
        self.origin = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Trial time of `instant`; instants before the origin map to zero.
    pub fn since_origin(&self, instant: Instant) -> Duration {
        instant.saturating_duration_since(self.origin)
    }

    /// The instant at trial time `at`.
    pub fn instant_at(&self, at: Duration) -> Instant {
        self.origin + at
    }
}
