//! Engine configuration container.

use core::time::Duration;

/// ISO-TP addressing mode, fixed per engine instance rather than per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// PCI at payload byte 0.
    Normal,
    /// Payload byte 0 is a target-address extension folded into the
    /// effective identifier; PCI moves to byte 1.
    Extended,
}

impl AddressingMode {
    /// Index within an incoming payload where the PCI starts.
    pub fn pci_offset(self) -> usize {
        match self {
            AddressingMode::Normal => 0,
            AddressingMode::Extended => 1,
        }
    }

    /// Max application bytes a Single Frame may declare in this mode.
    pub fn max_single_frame_len(self) -> usize {
        7 - self.pci_offset()
    }

    /// Application bytes carried by a First Frame in this mode.
    pub fn first_frame_initial_len(self) -> usize {
        6 - self.pci_offset()
    }

    /// Max application bytes per Consecutive Frame in this mode.
    pub fn consecutive_frame_len(self) -> usize {
        7 - self.pci_offset()
    }
}

/// Configuration for an [`crate::IsoTpEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Addressing mode applied to inbound frames.
    pub addressing: AddressingMode,
    /// Answer inbound First Frames with an automatic ClearToSend frame
    /// addressed to the last identifier this engine transmitted to.
    pub issue_flow_control: bool,
    /// Require a partial transfer's channel to match as well as its
    /// identifier when routing Consecutive Frames and flush checks.
    pub match_channel: bool,
    /// Discard a partial transfer when a Consecutive Frame's sequence
    /// nibble does not match the expected rolling value. Off by default:
    /// the permissive mode accepts frames purely in arrival order.
    pub strict_sequence: bool,
    /// Skip frames this host transmitted itself when processing inbound
    /// batches.
    pub ignore_transmitted: bool,
    /// Block-size byte placed in automatic flow-control replies
    /// (0 = no limit).
    pub fc_block_size: u8,
    /// Separation-time byte placed in automatic flow-control replies,
    /// in milliseconds.
    pub fc_separation_ms: u8,
    /// Time budget for the peer to answer a First Frame with flow control
    /// before the scheduler falls back to unsolicited pacing.
    pub fc_wait_budget: Duration,
    /// Conservative inter-frame gap used once the flow-control budget
    /// elapses without a reply.
    pub fallback_gap: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            addressing: AddressingMode::Normal,
            issue_flow_control: false,
            match_channel: false,
            strict_sequence: false,
            ignore_transmitted: false,
            fc_block_size: 0,
            fc_separation_ms: 3,
            fc_wait_budget: Duration::from_millis(200),
            fallback_gap: Duration::from_millis(20),
        }
    }
}
