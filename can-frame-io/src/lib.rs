#![warn(missing_docs)]

//! Frame-level data model and transport traits for multi-bus CAN tools.
//!
//! This crate defines thin, dependency-light interfaces between a raw frame
//! transport (hardware adapter, socket bridge, replay source, …) and the
//! protocol layers sitting above it, so higher-level code can switch
//! backends without changing.
//!
//! - [`BusFrame`] is one classic CAN frame plus the metadata a multi-bus
//!   tool needs (channel index, direction, capture timestamp). It also
//!   implements [`embedded_can::Frame`] for ecosystem interoperability.
//! - [`FrameLink`] is the outbound seam: fire-and-forget frame submission
//!   to a transport that owns one or more physical channels.
//!
//! Inbound delivery is push-based and stays out of this crate: transports
//! hand batches of [`BusFrame`] values directly to whatever consumes them.

mod frame;

pub use crate::frame::{BusFrame, Direction};

/// Outbound access to a raw frame transport.
///
/// Implementations accept frames for transmission without delivery
/// confirmation; errors are backend-specific (queue full, device gone).
pub trait FrameLink {
    /// Backend-specific error type.
    type Error;

    /// Hand one frame to the transport for transmission.
    fn send_frame(&mut self, frame: &BusFrame) -> Result<(), Self::Error>;

    /// Number of physical channels this transport drives.
    fn channel_count(&self) -> usize;
}
