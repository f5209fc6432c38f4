use embedded_can::{ExtendedId, Frame as EmbeddedFrame, Id, StandardId};

const MAX_DLC: usize = 8;

/// Which way a frame crossed the adapter boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Delivered to us by the bus.
    Received,
    /// Sent onto the bus by us.
    Transmitted,
}

/// A classic CAN 2.0 frame tagged with its bus channel and capture metadata.
///
/// `BusFrame` is the unit handed between the frame transport and protocol
/// layers: an 11/29-bit identifier, up to 8 payload bytes, the channel index
/// of the physical bus it belongs to, a direction flag and a capture
/// timestamp. Frames are immutable once built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusFrame {
    channel: u8,
    id: u32,
    extended: bool,
    direction: Direction,
    data: [u8; MAX_DLC],
    dlc: u8,
    timestamp_us: u64,
}

impl BusFrame {
    /// Build a frame for transmission on the given channel.
    ///
    /// Identifiers above the 11-bit range are marked extended. Returns `None`
    /// if `data` exceeds 8 bytes or `id` exceeds 29 bits.
    pub fn outbound(channel: u8, id: u32, data: &[u8]) -> Option<Self> {
        Self::from_parts(channel, id, id > 0x7FF, Direction::Transmitted, data, 0)
    }

    /// Build a frame as delivered by a bus adapter.
    pub fn received(channel: u8, id: u32, extended: bool, data: &[u8], timestamp_us: u64) -> Option<Self> {
        Self::from_parts(channel, id, extended, Direction::Received, data, timestamp_us)
    }

    /// Fully explicit constructor.
    pub fn from_parts(
        channel: u8,
        id: u32,
        extended: bool,
        direction: Direction,
        data: &[u8],
        timestamp_us: u64,
    ) -> Option<Self> {
        if data.len() > MAX_DLC || id > ExtendedId::MAX.as_raw() {
            return None;
        }
        let mut buf = [0u8; MAX_DLC];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            channel,
            id,
            extended,
            direction,
            data: buf,
            dlc: data.len() as u8,
            timestamp_us,
        })
    }

    /// Bus channel index this frame belongs to.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Raw identifier bits (11 or 29 depending on [`BusFrame::is_extended`]).
    pub fn raw_id(&self) -> u32 {
        self.id
    }

    /// Direction relative to this host.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Capture timestamp in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }
}

impl EmbeddedFrame for BusFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let (raw, extended) = match id.into() {
            Id::Standard(std_id) => (std_id.as_raw() as u32, false),
            Id::Extended(ext_id) => (ext_id.as_raw(), true),
        };
        Self::from_parts(0, raw, extended, Direction::Received, data, 0)
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        // Remote frames carry no payload and never occur in ISO-TP traffic.
        None
    }

    fn is_extended(&self) -> bool {
        self.extended
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        if self.extended {
            Id::Extended(ExtendedId::new(self.id).unwrap_or(ExtendedId::MAX))
        } else {
            Id::Standard(StandardId::new(self.id as u16).unwrap_or(StandardId::MAX))
        }
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}
