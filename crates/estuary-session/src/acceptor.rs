use std::{io, net::SocketAddr};

use estuary_core::Pipe;
use estuary_net::{socket, with_reactor};
use estuary_protocol::{AProtocol, AcceptProtocol};
use mio::{Interest, Token};

/// Input-only I/O component whose protocol is the accept protocol, per
/// spec.md §4.8. `message_size`/`on_message` are driven internally by
/// [`Acceptor::poll`] rather than by a generic reader loop, since an
/// acceptor never produces byte-framed messages for a `Pipe` — the scratch
/// `Pipe` passed to the protocol below is never written to; it exists only
/// because [`AProtocol`] is shaped around one.
pub struct Acceptor {
    listener: mio::net::TcpListener,
    token: Token,
    protocol: AcceptProtocol<(mio::net::TcpStream, SocketAddr)>,
    scratch: Pipe,
}

impl Acceptor {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let mut listener = socket::listen(addr)?;
        let token = with_reactor(|r| {
            let token = r.next_io_token();
            r.registry().register(&mut listener, token, Interest::READABLE)?;
            io::Result::Ok(token)
        })?;
        Ok(Self { listener, token, protocol: AcceptProtocol::new(), scratch: Pipe::new() })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Drains every connection the listener has queued, returning the
    /// accepted sockets in acceptance order.
    pub fn poll(&mut self) -> Vec<(mio::net::TcpStream, SocketAddr)> {
        let mut out = Vec::new();
        loop {
            match self.listener.accept() {
                Ok(accepted) => {
                    self.protocol.deposit(accepted);
                    if self.protocol.message_size(&self.scratch) == 0 {
                        break;
                    }
                    self.protocol.on_message(&self.scratch, 1, &mut |_| {});
                    if let Some(pair) = self.protocol.take() {
                        out.push(pair);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(?err, "acceptor: accept failed");
                    break;
                }
            }
        }
        out
    }

    pub fn close(&mut self) {
        let _ = with_reactor(|r| r.registry().deregister(&mut self.listener));
    }
}
