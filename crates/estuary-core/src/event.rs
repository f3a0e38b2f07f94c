use uuid::Uuid;

/// Typed events a host (I/O component, session, or server) may receive.
///
/// A handler may be absent for any of these; the default is to ignore it,
/// except [`Event::Disconnected`] on an acceptor, where the default is to
/// panic (spec.md §7 — a listener losing its socket is unrecoverable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Peer sent a FIN with no protocol state pending. Connection may still
    /// be writable.
    Eof,
    /// The output pipe fully drained after a write.
    Eos,
    /// The peer disconnected or an I/O error forced disconnection.
    /// `reason == 0` is a graceful close; any other value is an errno or
    /// protocol-specific reason code.
    Disconnected { reason: i32 },
    /// The attached TLS handshake protocol reported completion.
    Handshake,
    /// A read pass ended with unconsumed bytes still staged in the input
    /// pipe (fired on the read→no-further-progress transition, not every
    /// turn — see SPEC_FULL.md §9 Open Questions).
    PendingRead { bytes: usize },
    /// A write pass ended with bytes still staged in the output pipe.
    PendingWrite { bytes: usize },
    /// Final teardown notification dispatched by `disconnect()`.
    Dispose,
    /// The host's underlying transport socket was extracted for handoff.
    Extracted { session: Uuid },
}
