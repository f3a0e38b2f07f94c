use std::io;

use estuary_core::Event;
use estuary_protocol::{AProtocol, Message};
use mio::{Interest, Registry, Token};

use crate::transport::TcpTransport;

/// What the caller should do after one read-readiness or write-readiness
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    /// Nothing more to do until the next reactor notification.
    Idle,
    /// The transport is gone; the host should tear down this component.
    Disconnected,
}

/// Hosts one protocol plus one TCP transport, attached to a reactor-chosen
/// `Token`. Implements the read/write loops spec.md §4.6 describes.
///
/// Grounded on `flux-network::tcp::connector::ConnectionVariant`, which
/// owns a bare `TcpStream` per connection; here the same per-connection
/// ownership is generalized over any `P: AProtocol` instead of one fixed
/// length-prefixed wire format.
pub struct BidirectionalComponent<P> {
    transport: TcpTransport,
    protocol: P,
    token: Token,
    readable_armed: bool,
    writable_armed: bool,
    had_pending_read: bool,
    had_pending_write: bool,
}

impl<P: AProtocol> BidirectionalComponent<P> {
    pub fn new(transport: TcpTransport, protocol: P, token: Token) -> Self {
        Self {
            transport,
            protocol,
            token,
            readable_armed: true,
            writable_armed: false,
            had_pending_read: false,
            had_pending_write: false,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn transport(&self) -> &TcpTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TcpTransport {
        &mut self.transport
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    /// Unwraps the component into its transport and protocol, e.g. to hand
    /// the raw transport off to another reactor (spec.md §4.8 "extract").
    pub fn into_parts(self) -> (TcpTransport, P) {
        (self.transport, self.protocol)
    }

    /// Copies `data` to the output pipe and arms `WRITABLE` interest if it
    /// wasn't already armed (spec.md §4.6 "write arming").
    pub fn publish(&mut self, registry: &Registry, data: &[u8]) -> io::Result<()> {
        self.transport.publish(data);
        self.arm_writable(registry)
    }

    /// Reconciles the socket's registered interest with `readable_armed`/
    /// `writable_armed`, deregistering entirely once neither is set.
    fn sync_interest(&mut self, registry: &Registry) -> io::Result<()> {
        match (self.readable_armed, self.writable_armed) {
            (true, true) => registry.reregister(
                self.transport.socket_mut(),
                self.token,
                Interest::READABLE | Interest::WRITABLE,
            ),
            (true, false) => {
                registry.reregister(self.transport.socket_mut(), self.token, Interest::READABLE)
            }
            (false, true) => {
                registry.reregister(self.transport.socket_mut(), self.token, Interest::WRITABLE)
            }
            (false, false) => registry.deregister(self.transport.socket_mut()),
        }
    }

    fn arm_writable(&mut self, registry: &Registry) -> io::Result<()> {
        if !self.writable_armed {
            self.writable_armed = true;
            self.sync_interest(registry)?;
        }
        Ok(())
    }

    fn disarm_writable(&mut self, registry: &Registry) -> io::Result<()> {
        if self.writable_armed {
            self.writable_armed = false;
            self.sync_interest(registry)?;
        }
        Ok(())
    }

    /// Suspends READ interest, per spec.md §4.6 step 1: once the peer has
    /// sent EOF, further readiness notifications for this fd would only
    /// ever observe 0 bytes again.
    fn disarm_readable(&mut self, registry: &Registry) -> io::Result<()> {
        if self.readable_armed {
            self.readable_armed = false;
            self.sync_interest(registry)?;
        }
        Ok(())
    }

    /// Drives the read loop: pulls bytes off the socket and feeds complete
    /// messages to `on_message` until the socket would block, the peer
    /// disconnects, or the protocol latches failed.
    ///
    /// `events` accumulates the informational/terminal events spec.md §4.6
    /// and §7 name. `pending_read` fires only on the empty→non-empty
    /// transition (SPEC_FULL.md §9), not on every turn with leftover bytes.
    pub fn on_readable(
        &mut self,
        registry: &Registry,
        on_message: &mut dyn FnMut(Message<'_>),
        events: &mut Vec<Event>,
    ) -> IoOutcome {
        loop {
            match self.transport.read() {
                Ok(0) => {
                    events.push(Event::Eof);
                    let _ = self.disarm_readable(registry);
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
                let size = self.protocol.message_size(self.transport.input());
                if size == 0 {
                    break;
                }
                if size > self.transport.input().size() {
                    tracing::error!(
                        reported = size,
                        available = self.transport.input().size(),
                        "protocol reported a frame larger than the buffered bytes"
                    );
                    events.push(Event::Disconnected { reason: 0 });
                    return IoOutcome::Disconnected;
                }

                self.protocol.on_message(self.transport.input(), size, on_message);
                if self.protocol.should_flush() {
                    self.transport.input_mut().free_front(size);
                }
                if !self.protocol.ok() {
                    events.push(Event::Disconnected { reason: 0 });
                    return IoOutcome::Disconnected;
                }
            }

            // A protocol may latch failed while reporting size 0 (e.g.
            // `LengthPrefixed` on an oversized header) — the loop above
            // only checks `ok()` right after a framed message, so it would
            // otherwise never observe this. Spec.md §4.6 step 2: "If the
            // host observed a protocol mark-failed, break and disconnect
            // after the loop."
            if !self.protocol.ok() {
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

    /// Drives the write loop on `WRITABLE` readiness.
    ///
    /// `pending_write` fires only on the drained→non-empty-after-a-send
    /// transition (a short write), mirroring `on_readable`'s `pending_read`
    /// transition-only behavior (SPEC_FULL.md §9 Open Questions).
    pub fn on_writable(&mut self, registry: &Registry, events: &mut Vec<Event>) -> IoOutcome {
        if self.transport.output().is_empty() {
            let _ = self.disarm_writable(registry);
            return IoOutcome::Idle;
        }

        match self.transport.write() {
            Ok(_) => {
                let remaining = self.transport.output().size();
                if remaining == 0 {
                    events.push(Event::Eos);
                    let _ = self.disarm_writable(registry);
                } else if !self.had_pending_write {
                    events.push(Event::PendingWrite { bytes: remaining });
                }
                self.had_pending_write = remaining > 0;
                IoOutcome::Idle
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => IoOutcome::Idle,
            Err(err) => {
                events.push(Event::Disconnected { reason: err.raw_os_error().unwrap_or(-1) });
                IoOutcome::Disconnected
            }
        }
    }

    /// Coarse cancellation: tears down the transport, deregisters the
    /// socket, and fires `Disconnected{reason=0}` + `Dispose` (spec.md §4.6
    /// cancellation). Idempotent — a second call is a no-op since
    /// `deregister` on an already-closed socket simply errors and is
    /// ignored, though it will push the events again; callers only invoke
    /// this once per live session.
    pub fn disconnect(&mut self, registry: &Registry, events: &mut Vec<Event>) {
        let _ = registry.deregister(self.transport.socket_mut());
        self.transport.close();
        events.push(Event::Disconnected { reason: 0 });
        events.push(Event::Dispose);
    }
}
