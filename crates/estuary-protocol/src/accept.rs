use estuary_core::Pipe;

use crate::protocol::{AProtocol, Message};

/// Bridges a listener's "new connection accepted" signal into the generic
/// `message_size`/`on_message` polling loop used by every other protocol in
/// this crate.
///
/// Ported from `qb::protocol::accept`
/// (`original_source/include/qb/io/protocol/accept.h`). The accepted socket
/// is not a byte-framed [`Message`], so it travels through
/// [`AcceptProtocol::take`] instead of the `emit` callback, which only ever
/// receives an empty marker message signaling "a socket is ready, go fetch
/// it".
pub struct AcceptProtocol<S> {
    accepted: Option<S>,
}

impl<S> AcceptProtocol<S> {
    pub fn new() -> Self {
        Self { accepted: None }
    }

    /// Called by the host's listener transport right after `accept()`
    /// succeeds.
    pub fn deposit(&mut self, socket: S) {
        self.accepted = Some(socket);
    }

    /// Called by the host from its `on_message` handler to retrieve the
    /// socket deposited above.
    pub fn take(&mut self) -> Option<S> {
        self.accepted.take()
    }
}

impl<S> Default for AcceptProtocol<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> AProtocol for AcceptProtocol<S> {
    fn message_size(&mut self, _input: &Pipe) -> usize {
        usize::from(self.accepted.is_some())
    }

    fn on_message(&mut self, _input: &Pipe, _size: usize, emit: &mut dyn FnMut(Message<'_>)) {
        emit(Message { data: &[] });
    }

    fn reset(&mut self) {
        self.accepted = None;
    }

    fn should_flush(&self) -> bool {
        false
    }
}
