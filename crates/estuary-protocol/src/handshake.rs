use std::cell::Cell;
use std::rc::Rc;

use estuary_core::Pipe;

use crate::protocol::{AProtocol, Message};

/// Shared flag a TLS transport flips once its handshake completes.
///
/// [`HandshakeProtocol::new`] hands one of these back to the caller so the
/// transport driving `rustls`' `process_new_packets` can signal completion
/// without the protocol needing a reference back to the transport (which
/// would make `AProtocol` generic over the I/O component, the exact
/// coupling spec.md §9's redesign note removes).
pub type HandshakeReady = Rc<Cell<bool>>;

/// Fires a one-shot [`estuary_core::Event::Handshake`]-equivalent message
/// once the underlying transport reports its TLS handshake done.
///
/// Ported from `qb::protocol::handshake`
/// (`original_source/include/qb/io/protocol/handshake.h`): `should_flush`
/// is false because this protocol never touches the input pipe, and the
/// dispatch happens exactly once (`getMessageSize` returns 0 forever after
/// the first `onMessage`).
pub struct HandshakeProtocol {
    ready: HandshakeReady,
    done: bool,
}

impl HandshakeProtocol {
    pub fn new() -> (Self, HandshakeReady) {
        let ready = Rc::new(Cell::new(false));
        (Self { ready: ready.clone(), done: false }, ready)
    }
}

impl AProtocol for HandshakeProtocol {
    fn message_size(&mut self, _input: &Pipe) -> usize {
        if self.done {
            return 0;
        }
        usize::from(self.ready.get())
    }

    fn on_message(&mut self, _input: &Pipe, _size: usize, emit: &mut dyn FnMut(Message<'_>)) {
        self.done = true;
        emit(Message { data: &[] });
    }

    fn reset(&mut self) {
        self.done = false;
        self.ready.set(false);
    }

    fn should_flush(&self) -> bool {
        false
    }
}
