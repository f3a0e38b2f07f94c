//! Pipe buffer, endpoint/URI, event and error types shared by the rest of
//! the estuary reactor/transport/protocol-framing stack.

pub mod assert;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod pipe;
pub mod uri;

pub use config::{ReactorConfig, TlsConfig, TlsVersion};
pub use endpoint::Endpoint;
pub use event::Event;
pub use pipe::Pipe;
pub use uri::{AddressFamily, QueryMultimap, Uri};
