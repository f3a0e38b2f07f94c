use std::{io, net::SocketAddr, os::fd::AsRawFd};

/// Outcome of a non-blocking connect attempt (spec.md §4.2).
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectStatus {
    /// The connection completed synchronously (rare, usually loopback).
    Done,
    /// In progress; caller must wait for write-readiness then call
    /// [`take_socket_error`].
    InProgress,
}

/// Opens a non-blocking TCP connection to `addr`.
///
/// Mirrors `flux-network::tcp::connector::ConnectionManager::maybe_reconnect`'s
/// `mio::net::TcpStream::connect` call, generalized into its own function so
/// both the transport and any higher-level reconnect policy can drive it.
pub fn n_connect(addr: SocketAddr) -> io::Result<(mio::net::TcpStream, ConnectStatus)> {
    let stream = mio::net::TcpStream::connect(addr)?;
    // mio's TcpStream::connect always returns a non-blocking, in-progress
    // socket on POSIX; take_error() below is how the caller confirms
    // completion once writable.
    Ok((stream, ConnectStatus::InProgress))
}

/// Polls `SO_ERROR` to confirm whether a non-blocking connect completed.
///
/// `Ok(None)` means the connect succeeded; `Ok(Some(err))` means it failed
/// with `err`; `Err` means the `getsockopt` syscall itself failed.
pub fn take_socket_error(stream: &mio::net::TcpStream) -> io::Result<Option<io::Error>> {
    stream.take_error()
}

/// Binds a TCP listener. `SO_REUSEADDR` is set before `bind` by `mio` itself
/// on Unix, matching spec.md §4.2's requirement.
///
/// Ported from `flux-network::tcp::connector::ConnectionManager::listen_at`.
pub fn listen(addr: SocketAddr) -> io::Result<mio::net::TcpListener> {
    mio::net::TcpListener::bind(addr)
}

/// Sets `TCP_NODELAY`, matching spec.md §6's "TCP_NODELAY is set on accepted
/// and connected TCP sockets" wire-behavior requirement.
pub fn set_nodelay(stream: &mio::net::TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)
}

/// Sets kernel `SO_SNDBUF`/`SO_RCVBUF`.
///
/// Ported from `flux-network::tcp::stream::set_socket_buf_size`.
pub fn set_socket_buf_size(stream: &mio::net::TcpStream, size: usize) {
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            (&raw const size).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&raw const size).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

/// Binds a Unix domain stream listener at `path`.
///
/// Ported from `qb::io::tcp::listener::listen_un`
/// (`original_source/source/io/src/tcp/listener.cpp`), which dispatches to
/// the Unix-socket path whenever a parsed [`crate::Endpoint`] (or, upstream,
/// a [`estuary_core::Uri`]) names the `AF_UNIX` family. Binding fails if a
/// stale socket file is already at `path`; the caller is expected to
/// `std::fs::remove_file` a leftover socket itself before rebinding, the
/// same manual cleanup the original leaves to its caller.
#[cfg(unix)]
pub fn listen_unix(path: &std::path::Path) -> io::Result<mio::net::UnixListener> {
    mio::net::UnixListener::bind(path)
}

/// Connects to a Unix domain stream socket at `path`.
///
/// Ported from `qb::io::tcp::socket::connect_un`
/// (`original_source/source/io/src/tcp/socket.cpp`).
#[cfg(unix)]
pub fn connect_unix(path: &std::path::Path) -> io::Result<mio::net::UnixStream> {
    mio::net::UnixStream::connect(path)
}

/// Classifies a socket `io::Error` per spec.md §4.2's failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketFailure {
    WouldBlock,
    Interrupted,
    PeerClosed,
    Fatal,
}

pub fn classify(err: &io::Error) -> SocketFailure {
    match err.kind() {
        io::ErrorKind::WouldBlock => SocketFailure::WouldBlock,
        io::ErrorKind::Interrupted => SocketFailure::Interrupted,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => SocketFailure::PeerClosed,
        _ => SocketFailure::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    #[test]
    fn classifies_would_block_as_transient() {
        let err = io::Error::from(ErrorKind::WouldBlock);
        assert_eq!(classify(&err), SocketFailure::WouldBlock);
    }

    #[test]
    fn classifies_connection_reset_as_peer_closed() {
        let err = io::Error::from(ErrorKind::ConnectionReset);
        assert_eq!(classify(&err), SocketFailure::PeerClosed);
    }

    #[test]
    fn classifies_other_as_fatal() {
        let err = io::Error::from(ErrorKind::PermissionDenied);
        assert_eq!(classify(&err), SocketFailure::Fatal);
    }

    #[test]
    fn listen_then_accept_round_trips_a_loopback_connection() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, status) = n_connect(addr).unwrap();
        assert_eq!(status, ConnectStatus::InProgress);
        // give the kernel a moment to complete the loopback handshake
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(take_socket_error(&client).unwrap().is_none());
        listener.accept().unwrap();
    }
}
