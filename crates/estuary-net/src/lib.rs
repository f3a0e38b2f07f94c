//! The `mio`-backed reactor, socket layer, transports, TLS overlay, and I/O
//! components that compose to run one side of a connection.

pub mod io_component;
pub mod reactor;
pub mod socket;
pub mod tls;
pub mod tls_component;
pub mod transport;
pub mod watcher;

pub use io_component::{BidirectionalComponent, IoOutcome};
pub use reactor::{Reactor, Turn, WatcherId, with_reactor};
pub use tls::{HandshakeStatus, PeerCertificateInfo, TlsTransport};
pub use tls_component::TlsComponent;
#[cfg(unix)]
pub use transport::UnixTransport;
pub use transport::{TcpTransport, UdpTransport};
pub use watcher::{Repeater, Watcher};
