use estuary_core::Pipe;

/// A view onto one complete, framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub data: &'a [u8],
}

/// Stateful byte-stream parser bound to an I/O component's input pipe.
///
/// Mirrors `qb::io::async::AProtocol` (see `original_source/include/qb/io/
/// async/protocol.h`), reworked from the CRTP template the original uses
/// into a trait object-safe contract, per spec.md §9's redesign note: the
/// framing hot path (`message_size`/`on_message`) stays monomorphic because
/// the I/O component is generic over `P: AProtocol`, not because the trait
/// itself uses generics.
pub trait AProtocol {
    /// Inspects `input` without consuming it and returns the number of
    /// bytes forming the next complete message, or 0 if more data is
    /// needed. Implementations that scan incrementally (delimiter search)
    /// must persist their scan offset so each new byte is examined once
    /// across repeated calls with a growing `input`.
    fn message_size(&mut self, input: &Pipe) -> usize;

    /// Consumes exactly `size` bytes (conceptually: the host flushes them
    /// from `input` afterward via `free_front` when [`AProtocol::
    /// should_flush`] is true) and emits the framed message through `emit`.
    fn on_message(&mut self, input: &Pipe, size: usize, emit: &mut dyn FnMut(Message<'_>));

    /// Clears any partial-parse state (used after a hard reset, e.g. after
    /// swapping protocols post-handshake).
    fn reset(&mut self);

    /// Soft failure flag: once set, the host completes any already-framed
    /// messages from the current read pass, then disconnects. This
    /// preserves "drain before close" for protocols like TLS close_notify.
    fn ok(&self) -> bool {
        true
    }

    fn mark_failed(&mut self) {}

    /// Whether the host should `input.free_front(size)` after
    /// `on_message`. False for protocols (the handshake protocol) that
    /// consume their bytes via a side channel instead of the input pipe.
    fn should_flush(&self) -> bool {
        true
    }
}
