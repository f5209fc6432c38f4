//! Inbound frame filtering.

use can_frame_io::BusFrame;

/// One identifier/mask acceptance entry bound to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    /// Channel the entry applies to.
    pub channel: u8,
    /// Identifier bits to compare under the mask.
    pub id: u32,
    /// Mask selecting which identifier bits participate in the match.
    pub mask: u32,
}

impl Filter {
    fn matches(&self, frame: &BusFrame) -> bool {
        frame.channel() == self.channel && (frame.raw_id() & self.mask) == (self.id & self.mask)
    }
}

/// Ordered set of filters deciding which inbound frames the engine inspects.
///
/// All operations are total; duplicates are allowed and the first matching
/// entry short-circuits the scan.
#[derive(Debug, Default)]
pub struct FilterTable {
    entries: Vec<Filter>,
    accept_all: bool,
}

impl FilterTable {
    /// Create an empty table (nothing passes until filters are added or
    /// accept-all is enabled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry unconditionally.
    pub fn add(&mut self, channel: u8, id: u32, mask: u32) {
        self.entries.push(Filter { channel, id, mask });
    }

    /// Remove every entry equal to the given triple.
    pub fn remove(&mut self, channel: u8, id: u32, mask: u32) {
        let target = Filter { channel, id, mask };
        self.entries.retain(|f| *f != target);
    }

    /// Empty the table.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Toggle bypass mode: when set, every frame passes.
    pub fn set_accept_all(&mut self, accept: bool) {
        self.accept_all = accept;
    }

    /// Whether bypass mode is active.
    pub fn accept_all(&self) -> bool {
        self.accept_all
    }

    /// Number of entries currently installed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are installed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide whether the engine should inspect this frame.
    pub fn should_process(&self, frame: &BusFrame) -> bool {
        self.accept_all || self.entries.iter().any(|f| f.matches(frame))
    }
}
