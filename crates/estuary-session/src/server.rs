use std::{collections::HashMap, io, net::SocketAddr, time::Duration};

use estuary_core::Event;
use estuary_net::{BidirectionalComponent, IoOutcome, TcpTransport, with_reactor};
use estuary_protocol::{AProtocol, Message};
use mio::{Interest, Token};
use uuid::Uuid;

use crate::{acceptor::Acceptor, session::Session};

/// Owns a listener and a UUID-keyed map of live sessions, per spec.md §4.8.
/// Each accepted socket gets a fresh protocol instance from
/// `protocol_factory` and is registered with the current thread's reactor
/// under a freshly-allocated `Token`; the `token_to_uuid` table translates
/// the reactor's per-turn `mio::Events` (which only know tokens) back to the
/// UUID the rest of the application addresses sessions by.
pub struct Server<P> {
    acceptor: Acceptor,
    sessions: HashMap<Uuid, Session<P>>,
    token_to_uuid: HashMap<Token, Uuid>,
    read_chunk_size: usize,
    protocol_factory: Box<dyn Fn() -> P>,
}

impl<P: AProtocol> Server<P> {
    pub fn bind(
        addr: SocketAddr,
        read_chunk_size: usize,
        protocol_factory: impl Fn() -> P + 'static,
    ) -> io::Result<Self> {
        Ok(Self {
            acceptor: Acceptor::bind(addr)?,
            sessions: HashMap::new(),
            token_to_uuid: HashMap::new(),
            read_chunk_size,
            protocol_factory: Box::new(protocol_factory),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.acceptor.local_addr()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, uuid: Uuid) -> Option<&Session<P>> {
        self.sessions.get(&uuid)
    }

    fn accept_pending(&mut self, on_accept: &mut dyn FnMut(Uuid)) {
        for (stream, addr) in self.acceptor.poll() {
            let mut transport = match TcpTransport::new(stream, self.read_chunk_size) {
                Ok(t) => t,
                Err(err) => {
                    tracing::warn!(?err, ?addr, "server: failed to wrap accepted socket");
                    continue;
                }
            };

            let registered = with_reactor(|r| {
                let token = r.next_io_token();
                r.registry().register(transport.socket_mut(), token, Interest::READABLE)?;
                io::Result::Ok(token)
            });
            let token = match registered {
                Ok(token) => token,
                Err(err) => {
                    tracing::warn!(?err, ?addr, "server: failed to register accepted socket");
                    continue;
                }
            };

            let uuid = Uuid::new_v4();
            let component = BidirectionalComponent::new(transport, (self.protocol_factory)(), token);
            self.sessions.insert(uuid, Session::new(uuid, component));
            self.token_to_uuid.insert(token, uuid);
            on_accept(uuid);
        }
    }

    /// One non-blocking reactor turn: accepts any pending connections, then
    /// dispatches readable/writable readiness to the session each token
    /// belongs to.
    pub fn poll_once(
        &mut self,
        mut on_message: impl FnMut(Uuid, Message<'_>),
        mut on_event: impl FnMut(Uuid, Event),
        mut on_accept: impl FnMut(Uuid),
    ) {
        let acceptor_token = self.acceptor.token();
        let readiness: Vec<(Token, bool, bool)> = with_reactor(|r| {
            r.run_once(Some(Duration::ZERO))
                .io_events
                .iter()
                .map(|ev| (ev.token(), ev.is_readable(), ev.is_writable()))
                .collect()
        });

        for (token, readable, writable) in readiness {
            if token == acceptor_token {
                if readable {
                    self.accept_pending(&mut on_accept);
                }
                continue;
            }

            let Some(&uuid) = self.token_to_uuid.get(&token) else { continue };
            // `extracted` wins over `disconnected`: once `extract_session`
            // has removed a session this turn, `token_to_uuid` no longer
            // resolves for it, so no further readiness is dispatched
            // (SPEC_FULL.md §9 Open Questions).
            if !self.sessions.contains_key(&uuid) {
                continue;
            }

            if readable {
                let mut events = Vec::new();
                let outcome = with_reactor(|r| {
                    self.sessions.get_mut(&uuid).unwrap().io_mut().on_readable(
                        r.registry(),
                        &mut |m| on_message(uuid, m),
                        &mut events,
                    )
                });
                for ev in events {
                    on_event(uuid, ev);
                }
                if outcome == IoOutcome::Disconnected {
                    self.session_closed(uuid, &mut on_event);
                    continue;
                }
            }

            if writable && self.sessions.contains_key(&uuid) {
                let mut events = Vec::new();
                let outcome = with_reactor(|r| {
                    self.sessions.get_mut(&uuid).unwrap().io_mut().on_writable(r.registry(), &mut events)
                });
                for ev in events {
                    on_event(uuid, ev);
                }
                if outcome == IoOutcome::Disconnected {
                    self.session_closed(uuid, &mut on_event);
                }
            }
        }
    }

    /// Removes `uuid` from the session map and tears its transport down,
    /// reporting the `Disconnected`/`Dispose` pair spec.md §4.6 requires of
    /// a coarse disconnect through `on_event`. Safe to call more than once;
    /// the second call is a no-op.
    pub fn session_closed(&mut self, uuid: Uuid, mut on_event: impl FnMut(Uuid, Event)) -> bool {
        let Some(mut session) = self.sessions.remove(&uuid) else { return false };
        self.token_to_uuid.remove(&session.token());
        let mut events = Vec::new();
        with_reactor(|r| session.io_mut().disconnect(r.registry(), &mut events));
        for ev in events {
            on_event(uuid, ev);
        }
        true
    }

    /// Forces a session closed from outside the read/write loop, e.g. in
    /// response to an application-level decision.
    pub fn unregister_session(&mut self, uuid: Uuid, on_event: impl FnMut(Uuid, Event)) -> bool {
        self.session_closed(uuid, on_event)
    }

    /// Removes `uuid` from the session map without tearing the transport
    /// down: deregisters its socket from the current reactor and hands the
    /// transport and protocol back to the caller for handoff elsewhere
    /// (spec.md §4.8's extraction operation).
    ///
    /// `extracted` wins any race against a peer-initiated close: once this
    /// returns `Some`, the map entry is already gone, so a disconnect that
    /// races it never finds a session to report against
    /// (SPEC_FULL.md §9 Open Questions).
    pub fn extract_session(
        &mut self,
        uuid: Uuid,
        mut on_event: impl FnMut(Uuid, Event),
    ) -> Option<(TcpTransport, P)> {
        let session = self.sessions.remove(&uuid)?;
        self.token_to_uuid.remove(&session.token());
        let (mut transport, protocol) = session.into_io().into_parts();
        with_reactor(|r| {
            let _ = r.registry().deregister(transport.socket_mut());
        });
        on_event(uuid, Event::Extracted { session: uuid });
        Some((transport, protocol))
    }

    /// Broadcasts `data` to every live session.
    pub fn stream(&mut self, data: &[u8]) {
        self.stream_if(data, |_| true);
    }

    /// Broadcasts `data` to every session for which `predicate(uuid)` is
    /// true. Write errors disconnect the offending session immediately
    /// rather than aborting the broadcast.
    pub fn stream_if(&mut self, data: &[u8], mut predicate: impl FnMut(Uuid) -> bool) {
        let targets: Vec<Uuid> = self.sessions.keys().copied().filter(|&uuid| predicate(uuid)).collect();
        let mut failed = Vec::new();
        with_reactor(|r| {
            for uuid in targets {
                let Some(session) = self.sessions.get_mut(&uuid) else { continue };
                if session.io_mut().publish(r.registry(), data).is_err() {
                    failed.push(uuid);
                }
            }
        });
        for uuid in failed {
            self.session_closed(uuid, |_, _| {});
        }
    }
}
