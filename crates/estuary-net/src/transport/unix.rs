use std::io::{self, Read, Write};

use estuary_core::Pipe;

/// A Unix domain stream transport: a socket plus the input/output `Pipe`
/// pair, identical in shape to [`super::tcp::TcpTransport`] but without
/// `TCP_NODELAY` (spec.md §6 — Nagle's algorithm has no meaning on a
/// loopback-only Unix socket).
///
/// Ported from `qb::io::tcp::socket`'s `AF_UNIX` path
/// (`original_source/source/io/src/tcp/socket.cpp`): the original reuses
/// one `socket` type across both address families and only special-cases
/// `TCP_NODELAY`; this crate keeps that distinction as two transport types
/// instead, since `estuary-protocol`'s `AProtocol` framing is identical
/// either way and the only difference is at the byte-I/O seam.
pub struct UnixTransport {
    stream: mio::net::UnixStream,
    input: Pipe,
    output: Pipe,
    read_chunk_size: usize,
}

impl UnixTransport {
    pub fn new(stream: mio::net::UnixStream, read_chunk_size: usize) -> Self {
        Self { stream, input: Pipe::new(), output: Pipe::new(), read_chunk_size }
    }

    pub fn socket(&self) -> &mio::net::UnixStream {
        &self.stream
    }

    pub fn socket_mut(&mut self) -> &mut mio::net::UnixStream {
        &mut self.stream
    }

    pub fn input(&self) -> &Pipe {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut Pipe {
        &mut self.input
    }

    pub fn output(&self) -> &Pipe {
        &self.output
    }

    /// Reads up to `read_chunk_size` bytes directly into `input`. Returns
    /// `Ok(0)` on a graceful EOF, `Ok(n)` for `n > 0` bytes read, or
    /// `Err(WouldBlock)`/other I/O error — same contract as
    /// [`super::tcp::TcpTransport::read`].
    pub fn read(&mut self) -> io::Result<usize> {
        let chunk = self.read_chunk_size;
        let buf = self.input.allocate_back(chunk);
        match self.stream.read(buf) {
            Ok(n) => {
                self.input.free_back(chunk - n);
                Ok(n)
            }
            Err(err) => {
                self.input.free_back(chunk);
                Err(err)
            }
        }
    }

    /// Sends as much of `output` as the kernel will accept in one call.
    pub fn write(&mut self) -> io::Result<usize> {
        if self.output.is_empty() {
            return Ok(0);
        }
        match self.stream.write(self.output.begin()) {
            Ok(n) => {
                if n == self.output.size() {
                    self.output.reset();
                } else {
                    self.output.free_front(n);
                    self.output.reorder();
                }
                Ok(n)
            }
            Err(err) => Err(err),
        }
    }

    pub fn publish(&mut self, data: &[u8]) -> &mut [u8] {
        let slice = self.output.allocate_back(data.len());
        slice.copy_from_slice(data);
        slice
    }

    pub fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read as _, Write as _},
        time::Duration,
    };

    use super::*;
    use crate::socket;

    #[test]
    fn publish_then_write_round_trips_to_a_peer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("estuary.sock");
        let listener = socket::listen_unix(&path).unwrap();
        let mut client_std = std::os::unix::net::UnixStream::connect(&path).unwrap();
        client_std.set_nonblocking(true).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let (accepted, _) = listener.accept().unwrap();

        let mut transport = UnixTransport::new(accepted, 4096);
        transport.publish(b"hello");
        let mut written = 0;
        while written == 0 {
            written = transport.write().unwrap();
        }

        let mut buf = [0u8; 5];
        let mut got = 0;
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while got < 5 && std::time::Instant::now() < deadline {
            match client_std.read(&mut buf[got..]) {
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("{e}"),
            }
        }
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_reports_zero_on_graceful_peer_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("estuary.sock");
        let listener = socket::listen_unix(&path).unwrap();
        let client = std::os::unix::net::UnixStream::connect(&path).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let (accepted, _) = listener.accept().unwrap();
        drop(client);
        std::thread::sleep(Duration::from_millis(20));

        let mut transport = UnixTransport::new(accepted, 4096);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            match transport.read() {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    assert!(std::time::Instant::now() < deadline, "timed out waiting for EOF");
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("{e}"),
            }
        }
    }
}
