//! Multi-frame reassembly state.

use can_frame_io::Direction;
use tracing::debug;

/// A fully reassembled (or in-progress) ISO-TP application message.
///
/// `id` is the *effective* identifier: under extended addressing the
/// target-address byte is folded in below the 29-bit frame identifier,
/// which is why it is wider than a raw CAN id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoTpMessage {
    /// Channel the message was observed on.
    pub channel: u8,
    /// Effective identifier (see type docs).
    pub id: u64,
    /// Whether the underlying frames used 29-bit identifiers.
    pub extended: bool,
    /// Direction of the underlying frames.
    pub direction: Direction,
    /// Total length the protocol declared for this message (0..=4095).
    pub declared_len: usize,
    /// Bytes accumulated so far (equals `declared_len` once complete).
    pub data: Vec<u8>,
    /// Capture timestamp of the frame that opened the message.
    pub timestamp_us: u64,
}

struct Partial {
    msg: IsoTpMessage,
    next_sn: u8,
}

/// Result of routing a Consecutive Frame into the set.
#[derive(Debug)]
pub enum AppendOutcome {
    /// No partial transfer matches the key; the frame is an orphan.
    NoTransfer,
    /// Bytes were appended; the message is still incomplete.
    InProgress,
    /// The message reached its declared length and was removed from the set.
    Completed(IsoTpMessage),
    /// Strict sequence checking failed; the partial transfer was dropped.
    Discarded,
}

/// In-progress multi-frame messages keyed by effective identifier.
///
/// Keys optionally include the channel (`match_channel`); with that off,
/// an identifier seen on any channel continues the same transfer, matching
/// the permissive behavior of identifier-only scanning.
#[derive(Default)]
pub struct AssemblySet {
    partials: Vec<Partial>,
}

impl AssemblySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of in-progress transfers.
    pub fn len(&self) -> usize {
        self.partials.len()
    }

    /// True when no transfer is in progress.
    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    fn position(&self, id: u64, channel: u8, match_channel: bool) -> Option<usize> {
        self.partials
            .iter()
            .position(|p| p.msg.id == id && (!match_channel || p.msg.channel == channel))
    }

    /// Discard any stale partial transfer under this key.
    ///
    /// Called whenever a new Single or First Frame reuses an in-progress
    /// key; the dropped partial never produces a completion event.
    pub fn flush(&mut self, id: u64, channel: u8, match_channel: bool) -> bool {
        match self.position(id, channel, match_channel) {
            Some(idx) => {
                let stale = self.partials.remove(idx);
                debug!(
                    id = stale.msg.id,
                    channel = stale.msg.channel,
                    received = stale.msg.data.len(),
                    declared = stale.msg.declared_len,
                    "flushing stale partial transfer"
                );
                true
            }
            None => false,
        }
    }

    /// Register a new partial transfer opened by a First Frame.
    pub fn start(&mut self, msg: IsoTpMessage) {
        self.partials.push(Partial { msg, next_sn: 1 });
    }

    /// Route a Consecutive Frame's bytes into the matching transfer.
    ///
    /// At most `per_frame_cap` bytes are taken from `chunk`, further capped
    /// by the declared remaining length. With `strict_sequence` set, a
    /// sequence-nibble mismatch drops the whole partial transfer instead of
    /// appending out-of-order data.
    pub fn append(
        &mut self,
        id: u64,
        channel: u8,
        match_channel: bool,
        strict_sequence: bool,
        sn: u8,
        chunk: &[u8],
        per_frame_cap: usize,
    ) -> AppendOutcome {
        let Some(idx) = self.position(id, channel, match_channel) else {
            return AppendOutcome::NoTransfer;
        };

        if strict_sequence && sn != self.partials[idx].next_sn {
            let dropped = self.partials.remove(idx);
            debug!(
                id = dropped.msg.id,
                expected = dropped.next_sn,
                got = sn,
                "sequence mismatch, discarding partial transfer"
            );
            return AppendOutcome::Discarded;
        }

        let partial = &mut self.partials[idx];
        let remaining = partial.msg.declared_len.saturating_sub(partial.msg.data.len());
        let take = remaining.min(per_frame_cap).min(chunk.len());
        partial.msg.data.extend_from_slice(&chunk[..take]);
        partial.next_sn = (partial.next_sn + 1) & 0x0F;

        if partial.msg.data.len() >= partial.msg.declared_len {
            let done = self.partials.remove(idx);
            AppendOutcome::Completed(done.msg)
        } else {
            AppendOutcome::InProgress
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(id: u64, channel: u8, declared: usize, initial: &[u8]) -> IsoTpMessage {
        IsoTpMessage {
            channel,
            id,
            extended: false,
            direction: Direction::Received,
            declared_len: declared,
            data: initial.to_vec(),
            timestamp_us: 0,
        }
    }

    #[test]
    fn orphan_chunk_reports_no_transfer() {
        let mut set = AssemblySet::new();
        assert!(matches!(
            set.append(0x7E8, 0, false, false, 1, &[0; 7], 7),
            AppendOutcome::NoTransfer
        ));
    }

    #[test]
    fn appends_until_declared_length() {
        let mut set = AssemblySet::new();
        set.start(partial(0x7E8, 0, 10, &[0, 1, 2, 3, 4, 5]));
        assert!(matches!(
            set.append(0x7E8, 0, false, false, 1, &[6, 7, 8, 9, 0xFF, 0xFF, 0xFF], 7),
            AppendOutcome::Completed(msg) if msg.data == vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn channel_matching_is_optional() {
        let mut set = AssemblySet::new();
        set.start(partial(0x7E8, 0, 20, &[0; 6]));
        // Identifier-only scan continues the transfer from another channel.
        assert!(matches!(
            set.append(0x7E8, 1, false, false, 1, &[0; 7], 7),
            AppendOutcome::InProgress
        ));
        // Strict channel matching treats it as an orphan.
        assert!(matches!(
            set.append(0x7E8, 1, true, false, 2, &[0; 7], 7),
            AppendOutcome::NoTransfer
        ));
    }

    #[test]
    fn flush_removes_only_the_keyed_transfer() {
        let mut set = AssemblySet::new();
        set.start(partial(0x7E8, 0, 20, &[0; 6]));
        set.start(partial(0x7E9, 0, 20, &[0; 6]));
        assert!(set.flush(0x7E8, 0, false));
        assert!(!set.flush(0x7E8, 0, false));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn strict_sequence_discards_on_mismatch() {
        let mut set = AssemblySet::new();
        set.start(partial(0x7E8, 0, 20, &[0; 6]));
        assert!(matches!(
            set.append(0x7E8, 0, false, true, 3, &[0; 7], 7),
            AppendOutcome::Discarded
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn permissive_mode_ignores_sequence_nibble() {
        let mut set = AssemblySet::new();
        set.start(partial(0x7E8, 0, 20, &[0; 6]));
        assert!(matches!(
            set.append(0x7E8, 0, false, false, 9, &[0; 7], 7),
            AppendOutcome::InProgress
        ));
    }

    #[test]
    fn sequence_wraps_through_zero() {
        let mut set = AssemblySet::new();
        // 6 initial + 15 * 7 + final chunk; enough to wrap the nibble.
        set.start(partial(0x600, 0, 120, &[0; 6]));
        let mut sn = 1u8;
        loop {
            match set.append(0x600, 0, false, true, sn, &[0; 7], 7) {
                AppendOutcome::InProgress => sn = (sn + 1) & 0x0F,
                AppendOutcome::Completed(msg) => {
                    assert_eq!(msg.data.len(), 120);
                    break;
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }
}
