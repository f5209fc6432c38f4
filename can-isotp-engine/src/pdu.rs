//! Encode and decode ISO-TP protocol control information.
//!
//! All transmit helpers produce full 8-byte classic CAN payloads,
//! zero-padded past the PCI and data. Decoding takes a `pci_offset` of 0
//! (normal addressing) or 1 (extended addressing, where byte 0 holds the
//! target-address extension and is interpreted by the caller).

use core::time::Duration;

/// Flow control status nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Clear to send more consecutive frames.
    ClearToSend,
    /// Suspend sending until another flow-control frame arrives.
    Wait,
    /// Abort: the receiver cannot take the transfer.
    Overflow,
}

/// Parsed ISO-TP Protocol Data Unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu<'a> {
    /// Complete payload in one frame.
    SingleFrame {
        /// Declared payload length (1..=7, 1..=6 under extended addressing).
        len: u8,
        /// The payload bytes.
        data: &'a [u8],
    },
    /// Opening frame of a segmented transfer.
    FirstFrame {
        /// Declared total length of the message (12 bits, max 4095).
        len: u16,
        /// Initial payload bytes carried alongside the length.
        data: &'a [u8],
    },
    /// Continuation frame of a segmented transfer.
    ConsecutiveFrame {
        /// Rolling 4-bit sequence number.
        sn: u8,
        /// Payload bytes; the receiver caps the useful portion against the
        /// declared remaining length.
        data: &'a [u8],
    },
    /// Receiver-to-sender pacing feedback.
    FlowControl {
        /// Flow status nibble.
        status: FlowStatus,
        /// Frames permitted before the next flow control (0 = unlimited).
        block_size: u8,
        /// Requested separation time, raw byte form.
        st_min: u8,
    },
}

/// Reasons a payload failed to parse as a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload too short for the PCI it announces.
    Truncated,
    /// Single Frame length nibble of 0 or beyond the addressing-mode limit.
    InvalidLength,
    /// Flow-control status nibble outside 0..=2.
    ReservedStatus,
    /// PCI high nibble outside the four defined frame kinds.
    UnknownPci,
}

/// Parse raw frame data into a PDU, reading the PCI at `pci_offset`.
///
/// Dispatches on the PCI high nibble to one helper per frame kind so the
/// four-variant contract stays visible in one place.
pub fn decode(data: &[u8], pci_offset: usize) -> Result<Pdu<'_>, DecodeError> {
    if data.len() <= pci_offset {
        return Err(DecodeError::Truncated);
    }
    match data[pci_offset] >> 4 {
        0x0 => decode_single(data, pci_offset),
        0x1 => decode_first(data, pci_offset),
        0x2 => decode_consecutive(data, pci_offset),
        0x3 => decode_flow_control(data, pci_offset),
        _ => Err(DecodeError::UnknownPci),
    }
}

fn decode_single(data: &[u8], pci_offset: usize) -> Result<Pdu<'_>, DecodeError> {
    let len = (data[pci_offset] & 0x0F) as usize;
    if len == 0 || len > 7 - pci_offset {
        return Err(DecodeError::InvalidLength);
    }
    let start = pci_offset + 1;
    if data.len() < start + len {
        return Err(DecodeError::Truncated);
    }
    Ok(Pdu::SingleFrame {
        len: len as u8,
        data: &data[start..start + len],
    })
}

fn decode_first(data: &[u8], pci_offset: usize) -> Result<Pdu<'_>, DecodeError> {
    if data.len() < pci_offset + 2 {
        return Err(DecodeError::Truncated);
    }
    let len = ((((data[pci_offset] & 0x0F) as u16) << 8) | data[pci_offset + 1] as u16) & 0x0FFF;
    Ok(Pdu::FirstFrame {
        len,
        data: &data[pci_offset + 2..],
    })
}

fn decode_consecutive(data: &[u8], pci_offset: usize) -> Result<Pdu<'_>, DecodeError> {
    Ok(Pdu::ConsecutiveFrame {
        sn: data[pci_offset] & 0x0F,
        data: &data[pci_offset + 1..],
    })
}

fn decode_flow_control(data: &[u8], pci_offset: usize) -> Result<Pdu<'_>, DecodeError> {
    if data.len() < pci_offset + 3 {
        return Err(DecodeError::Truncated);
    }
    let status = match data[pci_offset] & 0x0F {
        0x0 => FlowStatus::ClearToSend,
        0x1 => FlowStatus::Wait,
        0x2 => FlowStatus::Overflow,
        _ => return Err(DecodeError::ReservedStatus),
    };
    Ok(Pdu::FlowControl {
        status,
        block_size: data[pci_offset + 1],
        st_min: data[pci_offset + 2],
    })
}

/// Build a Single Frame payload. `payload` must be at most 7 bytes.
pub fn encode_single(payload: &[u8]) -> [u8; 8] {
    debug_assert!(payload.len() <= 7);
    let mut buf = [0u8; 8];
    buf[0] = payload.len() as u8;
    buf[1..1 + payload.len()].copy_from_slice(payload);
    buf
}

/// Build a First Frame payload carrying the 12-bit total length and the
/// first six message bytes.
pub fn encode_first(total_len: u16, initial: &[u8; 6]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0] = 0x10 | ((total_len >> 8) as u8 & 0x0F);
    buf[1] = (total_len & 0xFF) as u8;
    buf[2..8].copy_from_slice(initial);
    buf
}

/// Build a Consecutive Frame payload. `chunk` must be at most 7 bytes.
pub fn encode_consecutive(sn: u8, chunk: &[u8]) -> [u8; 8] {
    debug_assert!(chunk.len() <= 7);
    let mut buf = [0u8; 8];
    buf[0] = 0x20 | (sn & 0x0F);
    buf[1..1 + chunk.len()].copy_from_slice(chunk);
    buf
}

/// Build a Flow Control payload.
pub fn encode_flow_control(status: FlowStatus, block_size: u8, st_min: u8) -> [u8; 8] {
    let status_nibble = match status {
        FlowStatus::ClearToSend => 0x0,
        FlowStatus::Wait => 0x1,
        FlowStatus::Overflow => 0x2,
    };
    let mut buf = [0u8; 8];
    buf[0] = 0x30 | status_nibble;
    buf[1] = block_size;
    buf[2] = st_min;
    buf
}

/// Convert a raw STmin byte into the inter-frame gap the scheduler uses.
///
/// Bytes at or above 0xF1 request sub-millisecond pacing; the scheduler
/// cannot honor that, so they clamp to 1 ms. Everything else is taken as
/// whole milliseconds.
pub fn st_min_to_gap(raw: u8) -> Duration {
    if raw >= 0xF1 {
        Duration::from_millis(1)
    } else {
        Duration::from_millis(raw as u64)
    }
}
