pub mod tcp;
#[cfg(unix)]
pub mod unix;
pub mod udp;

pub use tcp::TcpTransport;
#[cfg(unix)]
pub use unix::UnixTransport;
pub use udp::UdpTransport;
