use std::{cell::RefCell, time::Duration};

use mio::{Events, Poll, Registry, Token};

use crate::watcher::Watcher;

/// Handle to a non-I/O watcher registered with a [`Reactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(usize);

/// One `run_once()` turn's results: the raw `mio` I/O events (dispatched by
/// the caller, which owns the token→host table — see
/// `estuary-session::Server`) plus the ids of any timer/signal/file-stat/
/// child watchers that fired this turn.
pub struct Turn<'a> {
    pub io_events: &'a Events,
    pub fired: Vec<WatcherId>,
}

/// Thread-local reactor: a `mio::Poll` plus a slot table of non-I/O
/// watchers.
///
/// Grounded on `flux-network::tcp::connector::ConnectionManager`'s
/// `Poll`/`Events` pair, generalized per spec.md §4.7/§9: a closed `Watcher`
/// enum replaces the source's type-erased per-kind trampoline, and
/// `with_reactor` replaces a naked `thread_local!` reference so nested
/// reactor access (e.g. a watcher's own handler re-entering the reactor)
/// goes through one controlled borrow point instead of aliasing a raw
/// `&mut`.
pub struct Reactor {
    poll: Poll,
    events: Events,
    watchers: Vec<Option<Watcher>>,
    free_slots: Vec<usize>,
    next_io_token: usize,
}

impl Reactor {
    fn new() -> Self {
        Self {
            poll: Poll::new().expect("failed to create reactor event loop"),
            events: Events::with_capacity(256),
            watchers: Vec::new(),
            free_slots: Vec::new(),
            next_io_token: 0,
        }
    }

    /// The `mio::Registry` used to register/deregister sockets. I/O
    /// watchers are identified purely by the `Token` the caller chooses via
    /// [`Reactor::next_io_token`]; the reactor does not otherwise track
    /// them, since dispatch is the token-owning host's job (spec.md §4.7
    /// leaves per-fd readiness delivery to the host component).
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Allocates a fresh `Token` for a socket the caller is about to
    /// register with [`Reactor::registry`].
    pub fn next_io_token(&mut self) -> Token {
        let t = Token(self.next_io_token);
        self.next_io_token += 1;
        t
    }

    /// Registers a non-I/O watcher (timer, signal, file-stat, child).
    pub fn register_event(&mut self, watcher: Watcher) -> WatcherId {
        if let Some(slot) = self.free_slots.pop() {
            self.watchers[slot] = Some(watcher);
            WatcherId(slot)
        } else {
            self.watchers.push(Some(watcher));
            WatcherId(self.watchers.len() - 1)
        }
    }

    /// Stops and deallocates a watcher. No-op if already removed.
    pub fn unregister_event(&mut self, id: WatcherId) {
        if let Some(slot) = self.watchers.get_mut(id.0) {
            *slot = None;
            self.free_slots.push(id.0);
        }
    }

    /// Polls the OS event loop once and every non-I/O watcher, returning
    /// both in one [`Turn`]. `timeout = None` blocks until an I/O event or
    /// a wake; `Some(Duration::ZERO)` is a non-blocking poll
    /// (run-nowait semantics from spec.md §4.7).
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Turn<'_> {
        if let Err(err) = self.poll.poll(&mut self.events, timeout) {
            if err.kind() != std::io::ErrorKind::Interrupted {
                tracing::error!(?err, "reactor: poll failed");
            }
        }

        let mut fired = Vec::new();
        for (slot, watcher) in self.watchers.iter_mut().enumerate() {
            if let Some(w) = watcher
                && w.poll_fired()
            {
                fired.push(WatcherId(slot));
            }
        }

        Turn { io_events: &self.events, fired }
    }
}

thread_local! {
    static REACTOR: RefCell<Reactor> = RefCell::new(Reactor::new());
}

/// Accessor for the current thread's reactor. Per spec.md §4.7, reactors
/// are strictly single-threaded and thread-local; this is the only way to
/// reach one, so a handler cannot accidentally hold a `&mut Reactor` across
/// a call that re-enters the reactor (e.g. from within a watcher callback).
pub fn with_reactor<R>(f: impl FnOnce(&mut Reactor) -> R) -> R {
    REACTOR.with(|r| f(&mut r.borrow_mut()))
}
