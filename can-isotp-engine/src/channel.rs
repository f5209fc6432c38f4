//! Per-channel outbound transfer state.

use std::collections::VecDeque;
use std::time::Duration;

use can_frame_io::BusFrame;

/// Phase of a channel's outbound state machine.
///
/// A channel accepts a new transfer only while `Idle`; the engine rejects
/// overlapping sends instead of interleaving their frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    /// Nothing in flight.
    Idle,
    /// First Frame sent (or Wait received); no continuation frames may go
    /// out until flow control arrives or the wait budget elapses.
    WaitingForFlow,
    /// Continuation frames are being paced out of the queue.
    Draining,
}

/// Pacing state for one physical channel.
///
/// Deadlines use the engine clock's instant type; a `None` deadline means
/// the channel's timer is stopped.
#[derive(Debug)]
pub struct ChannelState<I> {
    pub(crate) phase: TxPhase,
    pub(crate) queue: VecDeque<BusFrame>,
    /// Frames allowed before the next flow control; -1 means unlimited.
    pub(crate) frames_until_fc: i32,
    pub(crate) gap: Duration,
    pub(crate) deadline: Option<I>,
}

impl<I: Copy + PartialOrd> ChannelState<I> {
    pub(crate) fn new() -> Self {
        Self {
            phase: TxPhase::Idle,
            queue: VecDeque::new(),
            frames_until_fc: -1,
            gap: Duration::from_millis(0),
            deadline: None,
        }
    }

    /// Current phase, for embedders that schedule around the engine.
    pub fn phase(&self) -> TxPhase {
        self.phase
    }

    /// Continuation frames still queued.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// A transfer is in flight in some form; new sends are rejected and
    /// inbound flow control has something to act on.
    pub(crate) fn is_busy(&self) -> bool {
        self.phase != TxPhase::Idle || !self.queue.is_empty()
    }

    /// Arm the channel after a First Frame went out: everything queued,
    /// blocked on flow control until `deadline`.
    pub(crate) fn begin_transfer(&mut self, frames: Vec<BusFrame>, deadline: I) {
        self.queue = frames.into();
        self.frames_until_fc = -1;
        self.phase = TxPhase::WaitingForFlow;
        self.deadline = Some(deadline);
    }

    /// ClearToSend: resume draining with the negotiated block and gap.
    pub(crate) fn clear_to_send(&mut self, block_size: u8, gap: Duration, deadline: I) {
        self.frames_until_fc = if block_size == 0 { -1 } else { block_size as i32 };
        self.gap = gap;
        self.phase = TxPhase::Draining;
        self.deadline = Some(deadline);
    }

    /// Wait: stop the timer entirely until another flow control arrives.
    pub(crate) fn wait(&mut self) {
        self.phase = TxPhase::WaitingForFlow;
        self.deadline = None;
    }

    /// Overflow/abort: drop the whole transfer, no completion event.
    pub(crate) fn abort(&mut self) {
        self.queue.clear();
        self.frames_until_fc = -1;
        self.phase = TxPhase::Idle;
        self.deadline = None;
    }

    pub(crate) fn finish(&mut self) {
        self.frames_until_fc = -1;
        self.phase = TxPhase::Idle;
        self.deadline = None;
    }

    pub(crate) fn due(&self, now: I) -> bool {
        matches!(self.deadline, Some(d) if now >= d)
    }
}
