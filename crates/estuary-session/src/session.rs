use estuary_net::BidirectionalComponent;
use estuary_protocol::AProtocol;
use mio::Token;
use uuid::Uuid;

/// One accepted connection: a UUID identity plus the generic read/write
/// component that drives it. Grounded on spec.md §4.8's session object,
/// which is "the new transport plus its protocol instance, addressed by a
/// UUID rather than by `Token` once it is past the acceptor" — the `Token`
/// is kept too, since the reactor and the session map both need a way to
/// find this session from an event (`Token` for I/O readiness, `Uuid` for
/// everything application-facing: broadcast, lookup, extraction).
pub struct Session<P> {
    uuid: Uuid,
    io: BidirectionalComponent<P>,
}

impl<P: AProtocol> Session<P> {
    pub fn new(uuid: Uuid, io: BidirectionalComponent<P>) -> Self {
        Self { uuid, io }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn token(&self) -> Token {
        self.io.token()
    }

    pub fn io(&self) -> &BidirectionalComponent<P> {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut BidirectionalComponent<P> {
        &mut self.io
    }

    pub fn into_io(self) -> BidirectionalComponent<P> {
        self.io
    }
}
