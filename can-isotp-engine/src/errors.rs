//! Engine error types.

/// Errors surfaced by the outbound half of the engine.
///
/// The inbound path has no error surface at all: malformed frames, orphan
/// continuations and stale-transfer collisions are absorbed silently so bus
/// traffic keeps flowing.
#[derive(Debug)]
pub enum EngineError<E> {
    /// Channel index beyond what the frame transport drives.
    UnknownChannel,
    /// A multi-frame transfer is still draining on this channel.
    ChannelBusy,
    /// Payload exceeds the 4095-byte ISO-TP limit.
    PayloadTooLarge,
    /// Identifier does not fit in 29 bits.
    InvalidIdentifier,
    /// Wrapper around transport-specific errors.
    Link(E),
}

impl<E> From<E> for EngineError<E> {
    /// Convert a transport-specific error into [`EngineError::Link`].
    fn from(err: E) -> Self {
        EngineError::Link(err)
    }
}
