use std::{
    io::Read,
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream},
    thread,
    time::{Duration, Instant},
};

use estuary_protocol::{HeaderWidth, LengthPrefixed};
use estuary_session::Server;

const NUM_RECEIVERS: usize = 4;
const BURST_SIZE: usize = 20;

fn framed(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn spawn_receiver(addr: SocketAddr) -> thread::JoinHandle<Vec<u32>> {
    thread::spawn(move || {
        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut seqs = Vec::with_capacity(BURST_SIZE);
        for _ in 0..BURST_SIZE {
            let mut header = [0u8; 2];
            client.read_exact(&mut header).unwrap();
            let len = u16::from_be_bytes(header) as usize;
            let mut payload = vec![0u8; len];
            client.read_exact(&mut payload).unwrap();
            seqs.push(u32::from_be_bytes(payload[..4].try_into().unwrap()));
        }
        seqs
    })
}

/// Ported from `flux-network/tests/tcp_broadcast_burst.rs`'s shape: a
/// listener broadcasts a burst of frames to several connected receivers and
/// every receiver must see every frame, in order. Scaled down to small
/// frames since `estuary_session::Server::poll_once` is driven by hand here
/// rather than pumped by a dedicated poller thread.
#[test]
fn broadcast_burst_reaches_every_receiver_in_order() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let mut server =
        Server::bind(bind_addr, 4096, || LengthPrefixed::new(HeaderWidth::Two, 4096)).unwrap();
    let addr = server.local_addr().unwrap();

    let receivers: Vec<_> = (0..NUM_RECEIVERS).map(|_| spawn_receiver(addr)).collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while server.session_count() < NUM_RECEIVERS && Instant::now() < deadline {
        server.poll_once(|_, _| {}, |_, _| {}, |_| {});
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(server.session_count(), NUM_RECEIVERS, "not all receivers connected");

    for seq in 0..BURST_SIZE as u32 {
        let frame = framed(&seq.to_be_bytes());
        server.stream(&frame);
        // Pump a few turns so mio can flush each broadcast before the next.
        for _ in 0..5 {
            server.poll_once(|_, _| {}, |_, _| {}, |_| {});
        }
    }

    let pump_deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < pump_deadline {
        server.poll_once(|_, _| {}, |_, _| {}, |_| {});
        thread::sleep(Duration::from_millis(2));
    }

    for (i, handle) in receivers.into_iter().enumerate() {
        let seqs = handle.join().unwrap_or_else(|_| panic!("receiver {i} panicked"));
        assert_eq!(seqs, (0..BURST_SIZE as u32).collect::<Vec<_>>(), "receiver {i} out of order");
    }
}
