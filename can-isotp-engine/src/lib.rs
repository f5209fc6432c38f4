#![warn(missing_docs)]

//! ISO-TP (ISO 15765-2) transport engine for multi-bus CAN tools.
//!
//! ISO-TP carries application messages of up to 4095 bytes over 8-byte CAN
//! frames by segmenting them into:
//! - a **Single Frame** (small payloads),
//! - a **First Frame** + multiple **Consecutive Frames** (larger payloads),
//!   and
//! - **Flow Control** frames to regulate pacing and batching.
//!
//! Unlike a point-to-point ISO-TP node bound to one rx/tx identifier pair,
//! [`IsoTpEngine`] watches whole buses: a [`FilterTable`] gates which
//! inbound frames are inspected, reassembly runs per effective identifier
//! (optionally per channel), and each physical channel gets an independent
//! send scheduler advanced from a single [`IsoTpEngine::tick`] call. This
//! fits frame-sniffing tools that decode ISO-TP conversations between other
//! nodes as well as ones that actively talk to an ECU.
//!
//! The engine is single-threaded and event-driven: all state mutation
//! happens inside [`IsoTpEngine::process_frames`], [`IsoTpEngine::tick`]
//! and [`IsoTpEngine::send_message`], none of which block. Embedders that
//! receive frames on a different execution context than their timer must
//! serialize those calls themselves.
//!
//! Malformed frames, orphan continuations and stale partial transfers are
//! absorbed (with `tracing` diagnostics) rather than surfaced; the only
//! errors callers see are outbound ones ([`EngineError`]).
//!
//! # Quick start
//! ```rust,ignore
//! use can_isotp_engine::{EngineConfig, IsoTpEngine};
//!
//! let mut engine = IsoTpEngine::with_std_clock(link, EngineConfig::default());
//! engine.set_accept_all(true);
//!
//! // Inbound: push frame batches from the transport, collect messages.
//! engine.process_frames(&frames, &mut |msg| println!("{:02X?}", msg.data))?;
//!
//! // Outbound: send, then tick the scheduler from a timer.
//! engine.send_message(0, 0x7E0, &payload)?;
//! loop {
//!     engine.tick()?;
//!     if engine.channel(0).unwrap().phase() == TxPhase::Idle {
//!         break;
//!     }
//! }
//! ```

pub mod assembly;
pub mod channel;
pub mod config;
pub mod errors;
pub mod filter;
pub mod pdu;
pub mod timer;

pub use assembly::{AppendOutcome, AssemblySet, IsoTpMessage};
pub use channel::{ChannelState, TxPhase};
pub use config::{AddressingMode, EngineConfig};
pub use errors::EngineError;
pub use filter::{Filter, FilterTable};
pub use timer::{Clock, StdClock};

use can_frame_io::{BusFrame, Direction, FrameLink};
use embedded_can::Frame as _;
use tracing::{debug, trace, warn};

use crate::pdu::{FlowStatus, Pdu};

/// Largest application payload ISO-TP can declare (12-bit length field).
pub const MAX_MESSAGE_LEN: usize = 4095;

/// ISO-TP engine over a raw frame transport.
///
/// Generic over the outbound [`FrameLink`] and a [`Clock`]; one channel
/// state is allocated per transport channel at construction.
pub struct IsoTpEngine<L, C = StdClock>
where
    L: FrameLink,
    C: Clock,
{
    link: L,
    clock: C,
    cfg: EngineConfig,
    filters: FilterTable,
    assembly: AssemblySet,
    channels: Vec<ChannelState<C::Instant>>,
    /// Last (channel, identifier) this engine transmitted to. Used as the
    /// reply address for automatic flow control: an inbound First Frame is
    /// assumed (not verified) to come from the peer most recently addressed.
    last_origin: Option<(u8, u32)>,
    receiving: bool,
}

impl<L: FrameLink> IsoTpEngine<L, StdClock> {
    /// Convenience constructor using [`StdClock`].
    pub fn with_std_clock(link: L, cfg: EngineConfig) -> Self {
        Self::new(link, cfg, StdClock)
    }
}

impl<L, C> IsoTpEngine<L, C>
where
    L: FrameLink,
    C: Clock,
{
    /// Build an engine over `link`, sizing one scheduler per channel.
    pub fn new(link: L, cfg: EngineConfig, clock: C) -> Self {
        let channels = (0..link.channel_count()).map(|_| ChannelState::new()).collect();
        Self {
            link,
            clock,
            cfg,
            filters: FilterTable::new(),
            assembly: AssemblySet::new(),
            channels,
            last_origin: None,
            receiving: true,
        }
    }

    /// Borrow the underlying transport.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutably borrow the underlying transport.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Scheduler state for one channel, if it exists.
    pub fn channel(&self, channel: u8) -> Option<&ChannelState<C::Instant>> {
        self.channels.get(channel as usize)
    }

    /// Number of multi-frame messages currently being reassembled.
    pub fn pending_reassemblies(&self) -> usize {
        self.assembly.len()
    }

    /// Earliest armed scheduler deadline across all channels, so an
    /// embedder can sleep until the next [`IsoTpEngine::tick`] is due.
    pub fn next_deadline(&self) -> Option<C::Instant> {
        let mut earliest: Option<C::Instant> = None;
        for state in &self.channels {
            if let Some(d) = state.deadline {
                earliest = match earliest {
                    Some(e) if e <= d => Some(e),
                    _ => Some(d),
                };
            }
        }
        earliest
    }

    /// Switch between normal and extended addressing for inbound frames.
    pub fn set_addressing(&mut self, mode: AddressingMode) {
        self.cfg.addressing = mode;
    }

    /// Enable or disable automatic ClearToSend replies to First Frames.
    pub fn set_flow_control_issuance(&mut self, issue: bool) {
        self.cfg.issue_flow_control = issue;
    }

    /// Enable or disable inbound processing entirely.
    pub fn set_reception(&mut self, receive: bool) {
        self.receiving = receive;
    }

    /// Toggle the filter table's accept-everything override.
    pub fn set_accept_all(&mut self, accept: bool) {
        self.filters.set_accept_all(accept);
    }

    /// Append a filter entry (duplicates allowed).
    pub fn add_filter(&mut self, channel: u8, id: u32, mask: u32) {
        self.filters.add(channel, id, mask);
    }

    /// Remove all filter entries exactly matching the triple.
    pub fn remove_filter(&mut self, channel: u8, id: u32, mask: u32) {
        self.filters.remove(channel, id, mask);
    }

    /// Empty the filter table.
    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// Transmit an application message on `channel` under `id`.
    ///
    /// Payloads under 8 bytes go out immediately as a Single Frame.
    /// Anything larger sends its First Frame now, queues the Consecutive
    /// Frames on the channel's scheduler and waits up to the configured
    /// flow-control budget for the peer's ClearToSend; if none arrives the
    /// scheduler falls back to conservative pacing rather than stalling.
    ///
    /// A channel drains one transfer at a time; starting another while one
    /// is in flight is rejected with [`EngineError::ChannelBusy`].
    pub fn send_message(
        &mut self,
        channel: u8,
        id: u32,
        bytes: &[u8],
    ) -> Result<(), EngineError<L::Error>> {
        let ch = channel as usize;
        if ch >= self.channels.len() {
            return Err(EngineError::UnknownChannel);
        }
        if bytes.len() > MAX_MESSAGE_LEN {
            return Err(EngineError::PayloadTooLarge);
        }
        if self.channels[ch].is_busy() {
            return Err(EngineError::ChannelBusy);
        }

        self.last_origin = Some((channel, id));

        if bytes.len() < 8 {
            let frame = BusFrame::outbound(channel, id, &pdu::encode_single(bytes))
                .ok_or(EngineError::InvalidIdentifier)?;
            self.link.send_frame(&frame)?;
            return Ok(());
        }

        let mut initial = [0u8; 6];
        initial.copy_from_slice(&bytes[..6]);
        let first = BusFrame::outbound(channel, id, &pdu::encode_first(bytes.len() as u16, &initial))
            .ok_or(EngineError::InvalidIdentifier)?;
        self.link.send_frame(&first)?;

        let mut queue = Vec::new();
        let mut sn = 1u8;
        for chunk in bytes[6..].chunks(7) {
            // Identifier already validated by the First Frame above.
            if let Some(frame) = BusFrame::outbound(channel, id, &pdu::encode_consecutive(sn, chunk))
            {
                queue.push(frame);
            }
            sn = (sn + 1) & 0x0F;
        }
        let deadline = self.clock.add(self.clock.now(), self.cfg.fc_wait_budget);
        self.channels[ch].begin_transfer(queue, deadline);
        Ok(())
    }

    /// Feed a batch of inbound frames through the engine.
    ///
    /// Frames pass the filter table first; each completed reassembly or
    /// accepted Single Frame is handed to `deliver`. Flow-control frames
    /// mutate the arrival channel's send scheduler instead of producing a
    /// message. Malformed or out-of-protocol frames are dropped silently.
    pub fn process_frames(
        &mut self,
        frames: &[BusFrame],
        deliver: &mut dyn FnMut(IsoTpMessage),
    ) -> Result<(), EngineError<L::Error>> {
        if !self.receiving {
            return Ok(());
        }
        for frame in frames {
            if self.cfg.ignore_transmitted && frame.direction() == Direction::Transmitted {
                continue;
            }
            if !self.filters.should_process(frame) {
                continue;
            }
            self.process_frame(frame, deliver)?;
        }
        Ok(())
    }

    fn process_frame(
        &mut self,
        frame: &BusFrame,
        deliver: &mut dyn FnMut(IsoTpMessage),
    ) -> Result<(), EngineError<L::Error>> {
        let data = frame.data();
        let pci_offset = self.cfg.addressing.pci_offset();
        // Under extended addressing byte 0 is the target-address extension,
        // folded in below the frame identifier to form the reassembly key.
        let key = match self.cfg.addressing {
            AddressingMode::Normal => frame.raw_id() as u64,
            AddressingMode::Extended => {
                let Some(addr) = data.first() else {
                    return Ok(());
                };
                ((frame.raw_id() as u64) << 8) | *addr as u64
            }
        };

        let pdu = match pdu::decode(data, pci_offset) {
            Ok(pdu) => pdu,
            Err(err) => {
                trace!(id = frame.raw_id(), channel = frame.channel(), ?err, "dropping malformed frame");
                return Ok(());
            }
        };

        match pdu {
            Pdu::SingleFrame { len: _, data: payload } => {
                self.assembly.flush(key, frame.channel(), self.cfg.match_channel);
                deliver(IsoTpMessage {
                    channel: frame.channel(),
                    id: key,
                    extended: frame.is_extended(),
                    direction: frame.direction(),
                    declared_len: payload.len(),
                    data: payload.to_vec(),
                    timestamp_us: frame.timestamp_us(),
                });
            }
            Pdu::FirstFrame { len, data: initial } => {
                self.assembly.flush(key, frame.channel(), self.cfg.match_channel);
                let take = initial.len().min(self.cfg.addressing.first_frame_initial_len());
                self.assembly.start(IsoTpMessage {
                    channel: frame.channel(),
                    id: key,
                    extended: frame.is_extended(),
                    direction: frame.direction(),
                    declared_len: len as usize,
                    data: initial[..take].to_vec(),
                    timestamp_us: frame.timestamp_us(),
                });
                self.issue_flow_control_reply()?;
            }
            Pdu::ConsecutiveFrame { sn, data: chunk } => {
                let outcome = self.assembly.append(
                    key,
                    frame.channel(),
                    self.cfg.match_channel,
                    self.cfg.strict_sequence,
                    sn,
                    chunk,
                    self.cfg.addressing.consecutive_frame_len(),
                );
                match outcome {
                    AppendOutcome::Completed(msg) => deliver(msg),
                    AppendOutcome::NoTransfer => {
                        trace!(id = key, channel = frame.channel(), "orphan consecutive frame")
                    }
                    AppendOutcome::InProgress | AppendOutcome::Discarded => {}
                }
            }
            Pdu::FlowControl {
                status,
                block_size,
                st_min,
            } => self.handle_flow_control(frame.channel(), status, block_size, st_min),
        }
        Ok(())
    }

    /// Answer a First Frame with ClearToSend, addressed to the last peer
    /// this engine transmitted to (a heuristic: the true originator is not
    /// derivable from the frame alone).
    fn issue_flow_control_reply(&mut self) -> Result<(), EngineError<L::Error>> {
        if !self.cfg.issue_flow_control {
            return Ok(());
        }
        let Some((channel, id)) = self.last_origin else {
            return Ok(());
        };
        let payload = pdu::encode_flow_control(
            FlowStatus::ClearToSend,
            self.cfg.fc_block_size,
            self.cfg.fc_separation_ms,
        );
        if let Some(frame) = BusFrame::outbound(channel, id, &payload) {
            self.link.send_frame(&frame)?;
        }
        Ok(())
    }

    fn handle_flow_control(&mut self, channel: u8, status: FlowStatus, block_size: u8, st_min: u8) {
        let Some(state) = self.channels.get_mut(channel as usize) else {
            trace!(channel, "flow control for unknown channel");
            return;
        };
        if !state.is_busy() {
            trace!(channel, "flow control with no transfer in flight");
            return;
        }
        match status {
            FlowStatus::ClearToSend => {
                let gap = pdu::st_min_to_gap(st_min);
                let deadline = self.clock.add(self.clock.now(), gap);
                state.clear_to_send(block_size, gap, deadline);
            }
            FlowStatus::Wait => state.wait(),
            FlowStatus::Overflow => {
                debug!(channel, dropped = state.queued(), "peer aborted transfer");
                state.abort();
            }
        }
    }

    /// Advance every channel's send scheduler.
    ///
    /// Call this from a periodic timer (or when [`IsoTpEngine::next_deadline`]
    /// elapses). Each due channel transmits at most one queued frame per
    /// call, honoring the negotiated block size and separation time; a
    /// channel whose flow-control budget expired without a reply resumes
    /// with the conservative fallback gap instead of stalling forever.
    pub fn tick(&mut self) -> Result<(), EngineError<L::Error>> {
        let now = self.clock.now();
        for channel in 0..self.channels.len() {
            if !self.channels[channel].due(now) {
                continue;
            }
            match self.channels[channel].phase {
                TxPhase::WaitingForFlow => {
                    let state = &mut self.channels[channel];
                    warn!(
                        channel,
                        "no flow control within budget, resuming with fallback pacing"
                    );
                    state.gap = self.cfg.fallback_gap;
                    state.phase = TxPhase::Draining;
                    state.deadline = Some(self.clock.add(now, state.gap));
                }
                TxPhase::Draining => {
                    if let Some(frame) = self.channels[channel].queue.pop_front() {
                        self.link.send_frame(&frame)?;
                        let state = &mut self.channels[channel];
                        if state.frames_until_fc > -1 {
                            state.frames_until_fc -= 1;
                            if state.frames_until_fc == 0 {
                                if state.queue.is_empty() {
                                    // Block exhausted on the final frame;
                                    // nothing left to gate.
                                    state.finish();
                                } else {
                                    // Block exhausted: nothing more until
                                    // the peer sends another flow control.
                                    state.phase = TxPhase::WaitingForFlow;
                                    state.deadline = None;
                                }
                                continue;
                            }
                        }
                        state.deadline = Some(self.clock.add(now, state.gap));
                    } else {
                        // Queue drained: transfer complete, no event.
                        self.channels[channel].finish();
                    }
                }
                TxPhase::Idle => self.channels[channel].deadline = None,
            }
        }
        Ok(())
    }
}
