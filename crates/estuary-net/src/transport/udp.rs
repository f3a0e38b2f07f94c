use std::{collections::VecDeque, io, net::SocketAddr};

use estuary_core::Pipe;

/// UDP transport: distinct from [`super::tcp::TcpTransport`] per spec.md
/// §4.4 — there is no connection state, so outbound frames carry their own
/// destination and the output side is a queue of whole datagrams rather
/// than a contiguous byte pipe.
///
/// New relative to the teacher (`flux-network` has no UDP code); grounded
/// on `mio::net::UdpSocket::{recv_from, send_to}` and the destination-
/// tagged frame queue spec.md §4.4 calls for.
pub struct UdpTransport {
    socket: mio::net::UdpSocket,
    input: Pipe,
    read_chunk_size: usize,
    /// The most recent sender, used as the implicit reply destination for
    /// [`UdpTransport::publish`].
    last_peer: Option<SocketAddr>,
    out_queue: VecDeque<(SocketAddr, Vec<u8>)>,
}

impl UdpTransport {
    pub fn new(socket: mio::net::UdpSocket, read_chunk_size: usize) -> Self {
        Self { socket, input: Pipe::new(), read_chunk_size, last_peer: None, out_queue: VecDeque::new() }
    }

    pub fn socket(&self) -> &mio::net::UdpSocket {
        &self.socket
    }

    pub fn input(&self) -> &Pipe {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut Pipe {
        &mut self.input
    }

    /// The peer a reply via bare [`UdpTransport::publish`] would be sent
    /// to, i.e. whoever sent the most recently read datagram.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.last_peer
    }

    /// Reads one datagram into `input`, recording its sender as the reply
    /// destination.
    pub fn read(&mut self) -> io::Result<usize> {
        let chunk = self.read_chunk_size;
        let buf = self.input.allocate_back(chunk);
        match self.socket.recv_from(buf) {
            Ok((n, peer)) => {
                self.input.free_back(chunk - n);
                self.last_peer = Some(peer);
                Ok(n)
            }
            Err(err) => {
                self.input.free_back(chunk);
                Err(err)
            }
        }
    }

    /// Queues `data` for delivery to `dest`.
    pub fn publish_to(&mut self, dest: SocketAddr, data: &[u8]) {
        self.out_queue.push_back((dest, data.to_vec()));
    }

    /// Queues `data` for delivery to the last-seen sender. Errors if no
    /// datagram has been read yet.
    pub fn publish(&mut self, data: &[u8]) -> io::Result<()> {
        let dest = self
            .last_peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no peer to reply to yet"))?;
        self.publish_to(dest, data);
        Ok(())
    }

    pub fn queued_frames(&self) -> usize {
        self.out_queue.len()
    }

    /// Emits one queued datagram via `sendto`. A `WouldBlock` leaves the
    /// frame at the front of the queue for the next writable notification;
    /// any other error drops it (UDP delivery is inherently unreliable, so
    /// there is nothing to retry).
    pub fn write(&mut self) -> io::Result<usize> {
        let Some((dest, frame)) = self.out_queue.front() else {
            return Ok(0);
        };
        match self.socket.send_to(frame, *dest) {
            Ok(n) => {
                self.out_queue.pop_front();
                Ok(n)
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(err),
            Err(err) => {
                self.out_queue.pop_front();
                Err(err)
            }
        }
    }

    pub fn close(&mut self) {
        self.out_queue.clear();
    }
}
