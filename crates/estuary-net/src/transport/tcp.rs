use std::{
    io::{self, Read, Write},
    net::Shutdown,
};

use estuary_core::Pipe;

/// A TCP transport: a socket plus the input/output `Pipe` pair spec.md §4.4
/// describes.
///
/// Directly generalizes `flux-network::tcp::stream::TcpStream`: that type's
/// `RxState::{ReadingHeader, ReadingPayload}` state machine and fixed frame
/// format are replaced here by a plain chunked read into `input` — framing
/// moves entirely to the `estuary-protocol` layer, since this transport no
/// longer assumes any particular wire format. Its `send_backlog`
/// (`VecDeque<Vec<u8>>`) collapses into `output`'s own `free_front`/
/// `reorder` bookkeeping (spec.md §4.1), since `Pipe` already behaves like a
/// single contiguous backlog entry.
pub struct TcpTransport {
    stream: mio::net::TcpStream,
    input: Pipe,
    output: Pipe,
    read_chunk_size: usize,
}

impl TcpTransport {
    pub fn new(stream: mio::net::TcpStream, read_chunk_size: usize) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream, input: Pipe::new(), output: Pipe::new(), read_chunk_size })
    }

    pub fn socket(&self) -> &mio::net::TcpStream {
        &self.stream
    }

    pub fn socket_mut(&mut self) -> &mut mio::net::TcpStream {
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
    /// `Err(WouldBlock)`/other I/O error.
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

    /// Sends as much of `output` as the kernel will accept in one call. On
    /// a partial write, the sent prefix is freed and the remainder
    /// compacted to offset 0 (`free_front` + `reorder`); on a complete
    /// drain, `output` is reset.
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

    /// Copies `data` into the output pipe; the caller (the I/O component)
    /// arms `WRITABLE` interest whenever this transitions `output` from
    /// empty to non-empty, matching `TcpStream::arm_writable`'s
    /// empty/non-empty invariant.
    pub fn publish(&mut self, data: &[u8]) -> &mut [u8] {
        let slice = self.output.allocate_back(data.len());
        slice.copy_from_slice(data);
        slice
    }

    pub fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read as _, Write as _},
        net::TcpStream as StdTcpStream,
        time::Duration,
    };

    use super::*;
    use crate::socket;

    #[test]
    fn publish_then_write_round_trips_to_a_peer() {
        let listener = socket::listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client_std = StdTcpStream::connect(addr).unwrap();
        client_std.set_nonblocking(true).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let (accepted, _) = listener.accept().unwrap();

        let mut transport = TcpTransport::new(accepted, 4096).unwrap();
        transport.publish(b"hello");
        let mut written = 0;
        while written == 0 {
            written = transport.write().unwrap();
        }

        let mut buf = [0u8; 5];
        let mut client_std = client_std;
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
        let listener = socket::listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let (accepted, _) = listener.accept().unwrap();
        drop(client);
        std::thread::sleep(Duration::from_millis(20));

        let mut transport = TcpTransport::new(accepted, 4096).unwrap();
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

    /// spec.md §8 backpressure scenario: a write larger than the kernel send
    /// buffer must report a short write, preserve the remainder, and
    /// compact it back to offset zero rather than losing bytes or blocking.
    #[test]
    fn short_write_preserves_and_reorders_the_remainder() {
        let listener = socket::listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        // Connect but never read from this socket, so the kernel send
        // buffer on the accepted side fills up.
        let _client = StdTcpStream::connect(addr).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let (accepted, _) = listener.accept().unwrap();

        let mut transport = TcpTransport::new(accepted, 4096).unwrap();
        let payload = vec![0xABu8; 10 * 1024 * 1024];
        transport.publish(&payload);
        assert_eq!(transport.output().size(), payload.len());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut sent_total = 0;
        loop {
            match transport.write() {
                Ok(n) if n > 0 => {
                    sent_total += n;
                    break;
                }
                Ok(_) | Err(_) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                other => panic!("expected a short write, got {other:?}"),
            }
        }

        assert!(sent_total < payload.len(), "write should not drain a 10 MiB payload in one call");
        assert_eq!(transport.output().size(), payload.len() - sent_total);
        // `reorder()` runs inside `write()` after a partial send, so the
        // remainder is already at offset zero and equals the payload's tail.
        assert_eq!(transport.output().begin(), &payload[sent_total..]);
    }
}
