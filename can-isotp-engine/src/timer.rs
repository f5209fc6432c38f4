//! Clock abstraction for the unified send scheduler.

use core::time::Duration;

/// Monotonic time source used to arm per-channel pacing deadlines.
///
/// The engine never sleeps; it only compares instants supplied by this
/// trait against armed deadlines during [`crate::IsoTpEngine::tick`].
pub trait Clock {
    /// Instant type produced by the clock.
    type Instant: Copy + PartialOrd;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Add a duration to an instant (saturating if needed).
    fn add(&self, instant: Self::Instant, dur: Duration) -> Self::Instant;
}

/// Standard library clock wrapper.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn add(&self, instant: Self::Instant, dur: Duration) -> Self::Instant {
        instant.checked_add(dur).unwrap_or(instant)
    }
}
