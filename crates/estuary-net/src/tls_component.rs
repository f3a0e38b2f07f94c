use std::io;

use estuary_core::{Event, Pipe};
use estuary_protocol::{AProtocol, HandshakeProtocol, HandshakeReady, Message};
use mio::{Interest, Registry, Token};

use crate::io_component::IoOutcome;
use crate::tls::{HandshakeStatus, TlsTransport};

enum Phase<P> {
    Handshaking { handshake: HandshakeProtocol, ready: HandshakeReady },
    Established(P),
}

/// Hosts one protocol plus one [`TlsTransport`], running the TLS handshake
/// to completion before handing bytes to the user-level protocol.
///
/// Kept separate from [`crate::io_component::BidirectionalComponent`]
/// rather than making that type transport-generic: a TLS transport has no
/// plaintext output buffer of its own to check for "anything queued to
/// send" — that state lives inside `rustls` and is polled through
/// [`TlsTransport::wants_write`] — so the write-arming logic below doesn't
/// line up with `BidirectionalComponent`'s pipe-based one (spec.md
/// §4.3/§4.4).
pub struct TlsComponent<P> {
    transport: TlsTransport,
    phase: Phase<P>,
    make_protocol: Option<Box<dyn FnOnce() -> P>>,
    token: Token,
    readable_armed: bool,
    writable_armed: bool,
    had_pending_read: bool,
}

impl<P: AProtocol> TlsComponent<P> {
    /// `make_protocol` runs exactly once, the instant the handshake
    /// completes, to build the protocol the established connection will
    /// run under (spec.md §4.3 step 3, "swap to the application
    /// protocol").
    pub fn new(
        transport: TlsTransport,
        make_protocol: impl FnOnce() -> P + 'static,
        token: Token,
    ) -> Self {
        let (handshake, ready) = HandshakeProtocol::new();
        Self {
            transport,
            phase: Phase::Handshaking { handshake, ready },
            make_protocol: Some(Box::new(make_protocol)),
            token,
            readable_armed: true,
            writable_armed: false,
            had_pending_read: false,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn transport(&self) -> &TlsTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TlsTransport {
        &mut self.transport
    }

    pub fn is_established(&self) -> bool {
        matches!(self.phase, Phase::Established(_))
    }

    pub fn protocol_mut(&mut self) -> Option<&mut P> {
        match &mut self.phase {
            Phase::Established(p) => Some(p),
            Phase::Handshaking { .. } => None,
        }
    }

    /// Reconciles the socket's registered interest with `readable_armed`/
    /// `writable_armed`, deregistering entirely once neither is set.
    ///
    /// A free function taking explicit field references, not a `&mut self`
    /// method: callers like `on_readable` need to invoke this while holding
    /// a separate mutable borrow of `self.phase` (as `protocol`), which a
    /// whole-`self` method would conflict with.
    fn sync_interest(
        transport: &mut TlsTransport,
        token: Token,
        readable_armed: bool,
        writable_armed: bool,
        registry: &Registry,
    ) -> io::Result<()> {
        match (readable_armed, writable_armed) {
            (true, true) => {
                registry.reregister(transport.socket_mut(), token, Interest::READABLE | Interest::WRITABLE)
            }
            (true, false) => registry.reregister(transport.socket_mut(), token, Interest::READABLE),
            (false, true) => registry.reregister(transport.socket_mut(), token, Interest::WRITABLE),
            (false, false) => registry.deregister(transport.socket_mut()),
        }
    }

    fn arm_writable(
        transport: &mut TlsTransport,
        token: Token,
        readable_armed: bool,
        writable_armed: &mut bool,
        registry: &Registry,
    ) -> io::Result<()> {
        if !*writable_armed {
            *writable_armed = true;
            Self::sync_interest(transport, token, readable_armed, *writable_armed, registry)?;
        }
        Ok(())
    }

    fn disarm_writable(
        transport: &mut TlsTransport,
        token: Token,
        readable_armed: bool,
        writable_armed: &mut bool,
        registry: &Registry,
    ) -> io::Result<()> {
        if *writable_armed {
            *writable_armed = false;
            Self::sync_interest(transport, token, readable_armed, *writable_armed, registry)?;
        }
        Ok(())
    }

    /// Suspends READ interest, per spec.md §4.6 step 1: once the peer has
    /// sent EOF, further readiness notifications for this fd would only
    /// ever observe 0 bytes again.
    fn disarm_readable(
        transport: &mut TlsTransport,
        token: Token,
        readable_armed: &mut bool,
        writable_armed: bool,
        registry: &Registry,
    ) -> io::Result<()> {
        if *readable_armed {
            *readable_armed = false;
            Self::sync_interest(transport, token, *readable_armed, writable_armed, registry)?;
        }
        Ok(())
    }

    /// Copies `data` into the TLS session's write buffer and arms
    /// `WRITABLE` interest. Only meaningful once [`Self::is_established`];
    /// calling it mid-handshake queues plaintext `rustls` won't flush
    /// until the handshake itself completes.
    pub fn publish(&mut self, registry: &Registry, data: &[u8]) -> io::Result<()> {
        self.transport.publish(data)?;
        Self::arm_writable(
            &mut self.transport,
            self.token,
            self.readable_armed,
            &mut self.writable_armed,
            registry,
        )
    }

    /// Steps the handshake state machine one notch. No-op once established.
    fn step_handshake(&mut self, registry: &Registry, events: &mut Vec<Event>) -> IoOutcome {
        if !matches!(self.phase, Phase::Handshaking { .. }) {
            return IoOutcome::Idle;
        }

        match self.transport.do_handshake() {
            HandshakeStatus::Done => {}
            HandshakeStatus::WantWrite => {
                let _ = Self::arm_writable(
                    &mut self.transport,
                    self.token,
                    self.readable_armed,
                    &mut self.writable_armed,
                    registry,
                );
                return IoOutcome::Idle;
            }
            HandshakeStatus::WantRead => return IoOutcome::Idle,
            HandshakeStatus::Fatal => {
                events.push(Event::Disconnected { reason: 0 });
                return IoOutcome::Disconnected;
            }
        }

        let Phase::Handshaking { handshake, ready } = &mut self.phase else {
            unreachable!("checked above")
        };
        ready.set(true);
        // HandshakeProtocol never reads its Pipe argument; a scratch one
        // avoids borrowing self.transport while self.phase is destructured.
        let scratch = Pipe::new();
        if handshake.message_size(&scratch) == 0 {
            return IoOutcome::Idle;
        }
        handshake.on_message(&scratch, 1, &mut |_| events.push(Event::Handshake));

        let make_protocol = self.make_protocol.take().expect("handshake completes exactly once");
        self.phase = Phase::Established(make_protocol());
        let _ = Self::disarm_writable(
            &mut self.transport,
            self.token,
            self.readable_armed,
            &mut self.writable_armed,
            registry,
        );
        IoOutcome::Idle
    }

    /// Drives the handshake (if still in progress) and, once established,
    /// the same read loop [`crate::io_component::BidirectionalComponent::on_readable`]
    /// runs: pull plaintext, feed complete frames to `on_message` until the
    /// socket would block, the peer disconnects, or the protocol latches
    /// failed.
    pub fn on_readable(
        &mut self,
        registry: &Registry,
        on_message: &mut dyn FnMut(Message<'_>),
        events: &mut Vec<Event>,
    ) -> IoOutcome {
        if self.step_handshake(registry, events) == IoOutcome::Disconnected {
            return IoOutcome::Disconnected;
        }

        let Phase::Established(protocol) = &mut self.phase else {
            return IoOutcome::Idle;
        };

        loop {
            match self.transport.read() {
                Ok(0) => {
                    events.push(Event::Eof);
                    let _ = Self::disarm_readable(
                        &mut self.transport,
                        self.token,
                        &mut self.readable_armed,
                        self.writable_armed,
                        registry,
                    );
                    return IoOutcome::Idle;
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return IoOutcome::Idle,
                Err(err) => {
                    events.push(Event::Disconnected { reason: err.raw_os_error().unwrap_or(-1) });
                    return IoOutcome::Disconnected;
                }
            }

            loop {
                let size = protocol.message_size(self.transport.input());
                if size == 0 {
                    break;
                }
                if size > self.transport.input().size() {
                    events.push(Event::Disconnected { reason: 0 });
                    return IoOutcome::Disconnected;
                }

                protocol.on_message(self.transport.input(), size, on_message);
                if protocol.should_flush() {
                    self.transport.input_mut().free_front(size);
                }
                if !protocol.ok() {
                    events.push(Event::Disconnected { reason: 0 });
                    return IoOutcome::Disconnected;
                }
            }

            // A protocol may latch failed while reporting size 0 — see
            // `BidirectionalComponent::on_readable` for the full rationale.
            if !protocol.ok() {
                events.push(Event::Disconnected { reason: 0 });
                return IoOutcome::Disconnected;
            }

            let remaining = self.transport.input().size();
            if remaining > 0 && !self.had_pending_read {
                events.push(Event::PendingRead { bytes: remaining });
            }
            self.had_pending_read = remaining > 0;
        }
    }

    /// Drives the handshake (if still in progress), then flushes queued
    /// ciphertext on `WRITABLE` readiness.
    pub fn on_writable(&mut self, registry: &Registry, events: &mut Vec<Event>) -> IoOutcome {
        if self.step_handshake(registry, events) == IoOutcome::Disconnected {
            return IoOutcome::Disconnected;
        }

        if !self.transport.wants_write() {
            let _ = Self::disarm_writable(
                &mut self.transport,
                self.token,
                self.readable_armed,
                &mut self.writable_armed,
                registry,
            );
            return IoOutcome::Idle;
        }

        match self.transport.write() {
            Ok(_) => {
                if !self.transport.wants_write() {
                    events.push(Event::Eos);
                    let _ = Self::disarm_writable(
                        &mut self.transport,
                        self.token,
                        self.readable_armed,
                        &mut self.writable_armed,
                        registry,
                    );
                }
                IoOutcome::Idle
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => IoOutcome::Idle,
            Err(err) => {
                events.push(Event::Disconnected { reason: err.raw_os_error().unwrap_or(-1) });
                IoOutcome::Disconnected
            }
        }
    }

    /// Coarse cancellation: sends `close_notify`, deregisters the socket,
    /// tears the transport down, and fires `Disconnected{reason=0}` +
    /// `Dispose` (spec.md §4.6 cancellation). Idempotent.
    pub fn disconnect(&mut self, registry: &Registry, events: &mut Vec<Event>) {
        let _ = registry.deregister(self.transport.socket_mut());
        self.transport.close();
        events.push(Event::Disconnected { reason: 0 });
        events.push(Event::Dispose);
    }
}
