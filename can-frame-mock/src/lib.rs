#![warn(missing_docs)]

//! In-memory test doubles for CAN frame transports.
//!
//! [`MockBus`] implements [`FrameLink`] over a recording sink so tests can
//! assert exactly which frames a protocol layer transmitted, and
//! [`MockClock`] is a manually advanced millisecond clock for deterministic
//! timer behavior. Neither touches real hardware or wall-clock time.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use can_frame_io::{BusFrame, FrameLink};
use can_isotp_engine::Clock;

/// Recording in-memory transport with a fixed number of channels.
#[derive(Debug)]
pub struct MockBus {
    channels: usize,
    sent: VecDeque<BusFrame>,
}

impl MockBus {
    /// Create a bus with `channels` simulated physical channels.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            sent: VecDeque::new(),
        }
    }

    /// All frames transmitted so far, in order, without consuming them.
    pub fn sent(&self) -> impl Iterator<Item = &BusFrame> {
        self.sent.iter()
    }

    /// Number of frames transmitted so far.
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    /// Pop the oldest transmitted frame.
    pub fn pop_sent(&mut self) -> Option<BusFrame> {
        self.sent.pop_front()
    }

    /// Drain every transmitted frame, oldest first.
    pub fn take_sent(&mut self) -> Vec<BusFrame> {
        self.sent.drain(..).collect()
    }
}

impl FrameLink for MockBus {
    type Error = core::convert::Infallible;

    fn send_frame(&mut self, frame: &BusFrame) -> Result<(), Self::Error> {
        self.sent.push_back(*frame);
        Ok(())
    }

    fn channel_count(&self) -> usize {
        self.channels
    }
}

/// Manually advanced millisecond clock.
///
/// Clones share the same underlying counter, so a test can keep one handle
/// while handing another to the code under test:
///
/// ```rust
/// use can_frame_mock::MockClock;
/// use can_isotp_engine::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let handle = clock.clone();
/// let start = clock.now();
/// handle.advance(Duration::from_millis(25));
/// assert_eq!(clock.now(), start + 25);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockClock {
    millis: Rc<Cell<u64>>,
}

impl MockClock {
    /// Create a clock starting at instant zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward. Sub-millisecond remainders are dropped.
    pub fn advance(&self, dur: Duration) {
        self.millis.set(self.millis.get() + dur.as_millis() as u64);
    }
}

impl Clock for MockClock {
    type Instant = u64;

    fn now(&self) -> Self::Instant {
        self.millis.get()
    }

    fn add(&self, instant: Self::Instant, dur: Duration) -> Self::Instant {
        instant.saturating_add(dur.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_records_frames_in_order() {
        let mut bus = MockBus::new(2);
        let a = BusFrame::outbound(0, 0x100, &[1]).unwrap();
        let b = BusFrame::outbound(1, 0x200, &[2]).unwrap();
        bus.send_frame(&a).unwrap();
        bus.send_frame(&b).unwrap();
        assert_eq!(bus.sent_count(), 2);
        assert_eq!(bus.pop_sent(), Some(a));
        assert_eq!(bus.take_sent(), vec![b]);
        assert_eq!(bus.channel_count(), 2);
    }

    #[test]
    fn clock_handles_share_time() {
        let clock = MockClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_millis(10));
        assert_eq!(clock.now(), 10);
        assert_eq!(clock.add(clock.now(), Duration::from_millis(5)), 15);
    }
}
