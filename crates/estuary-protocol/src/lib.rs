//! The `AProtocol` contract and concrete byte-framing codecs used to split
//! a transport's byte stream into discrete messages.

pub mod accept;
pub mod delimiter;
pub mod handshake;
pub mod length_prefixed;
pub mod protocol;

pub use accept::AcceptProtocol;
pub use delimiter::{BytesTerminated, ByteTerminated};
pub use handshake::{HandshakeProtocol, HandshakeReady};
pub use length_prefixed::{HeaderWidth, LengthPrefixed};
pub use protocol::{AProtocol, Message};
