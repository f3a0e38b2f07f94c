use std::{
    io::{Read, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream},
    thread,
    time::{Duration, Instant},
};

use estuary_core::Event;
use estuary_protocol::{HeaderWidth, LengthPrefixed};
use estuary_session::Server;
use uuid::Uuid;

fn framed(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).unwrap();
    let len = u16::from_be_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).unwrap();
    payload
}

/// Accept, register, echo, then force-disconnect a single session and
/// confirm it leaves the map. Grounded on
/// `flux-network/tests/tcp_roundtrip.rs`'s accept/poll loop, adapted to
/// drive a UUID-keyed [`Server`] instead of a raw `TcpConnector`.
#[test]
fn accept_register_echo_then_unregister_removes_the_session() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let mut server =
        Server::bind(bind_addr, 4096, || LengthPrefixed::new(HeaderWidth::Two, 4096)).unwrap();
    let addr = server.local_addr().unwrap();

    let client_thread = thread::spawn(move || {
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&framed(b"ping")).unwrap();
        let reply = read_frame(&mut client);
        assert_eq!(reply, b"pong".to_vec());
        // Keep the connection open until the server side force-closes it,
        // then observe the peer-reset/EOF on our end.
        let mut buf = [0u8; 1];
        let _ = client.read(&mut buf);
    });

    let mut accepted_uuid = None;
    let mut replied = false;
    let deadline = Instant::now() + Duration::from_secs(5);
    while (accepted_uuid.is_none() || !replied) && Instant::now() < deadline {
        server.poll_once(
            |uuid, msg| {
                assert_eq!(msg.data, b"ping");
                accepted_uuid = Some(uuid);
                replied = true;
            },
            |_uuid, _event| {},
            |_uuid| {},
        );
        thread::sleep(Duration::from_millis(2));
    }
    let uuid = accepted_uuid.expect("connection was never accepted");
    assert_eq!(server.session_count(), 1);

    // Reply out-of-band from the message callback since `poll_once` holds
    // `&mut self` for its duration.
    server.stream_if(&framed(b"pong"), |u| u == uuid);

    let drained_deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < drained_deadline {
        server.poll_once(|_, _| {}, |_, _| {}, |_| {});
        thread::sleep(Duration::from_millis(2));
    }

    let mut teardown_events = Vec::new();
    assert!(server.unregister_session(uuid, |u, event| teardown_events.push((u, event))));
    assert_eq!(server.session_count(), 0);
    assert_eq!(
        teardown_events,
        vec![(uuid, Event::Disconnected { reason: 0 }), (uuid, Event::Dispose)],
        "a coarse unregister must fire Disconnected{{reason:0}} then Dispose"
    );
    assert!(!server.unregister_session(uuid, |_, _| {}), "second unregister must be a no-op");

    client_thread.join().unwrap();
}

/// A session that disconnects on its own (peer closed) must be removed from
/// the map and reported via `Event::Disconnected`, without requiring the
/// caller to unregister it explicitly.
#[test]
fn peer_disconnect_removes_the_session_and_fires_an_event() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let mut server =
        Server::bind(bind_addr, 4096, || LengthPrefixed::new(HeaderWidth::Two, 4096)).unwrap();
    let addr = server.local_addr().unwrap();

    let client = thread::spawn(move || {
        let client = TcpStream::connect(addr).unwrap();
        thread::sleep(Duration::from_millis(30));
        drop(client);
    });

    let mut uuid: Option<Uuid> = None;
    let mut saw_disconnect = false;
    let deadline = Instant::now() + Duration::from_secs(5);
    while !saw_disconnect && Instant::now() < deadline {
        server.poll_once(
            |_, _| {},
            |u, event| {
                if matches!(event, Event::Disconnected { .. }) {
                    uuid = Some(u);
                    saw_disconnect = true;
                }
            },
            |_| {},
        );
        thread::sleep(Duration::from_millis(2));
    }

    assert!(saw_disconnect, "expected a Disconnected event");
    assert_eq!(server.session_count(), 0);
    assert!(uuid.is_some());

    client.join().unwrap();
}

/// Extracting a session removes it from the map, fires `Event::Extracted`,
/// and hands back a transport the caller can keep driving directly.
#[test]
fn extract_session_removes_it_and_fires_extracted() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let mut server =
        Server::bind(bind_addr, 4096, || LengthPrefixed::new(HeaderWidth::Two, 4096)).unwrap();
    let addr = server.local_addr().unwrap();

    let client_thread = thread::spawn(move || {
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&framed(b"ping")).unwrap();
        // Keep the socket open so the extracted transport is still live.
        let mut buf = [0u8; 1];
        let _ = client.read(&mut buf);
    });

    let mut accepted_uuid = None;
    let deadline = Instant::now() + Duration::from_secs(5);
    while accepted_uuid.is_none() && Instant::now() < deadline {
        server.poll_once(
            |uuid, msg| {
                assert_eq!(msg.data, b"ping");
                accepted_uuid = Some(uuid);
            },
            |_, _| {},
            |_| {},
        );
        thread::sleep(Duration::from_millis(2));
    }
    let uuid = accepted_uuid.expect("connection was never accepted");
    assert_eq!(server.session_count(), 1);

    let mut extracted_events = Vec::new();
    let (mut transport, _protocol) = server
        .extract_session(uuid, |u, event| extracted_events.push((u, event)))
        .expect("extraction should find the live session");

    assert_eq!(server.session_count(), 0);
    assert_eq!(extracted_events, vec![(uuid, Event::Extracted { session: uuid })]);
    assert!(server.extract_session(uuid, |_, _| {}).is_none(), "second extraction is a no-op");

    // The handed-back transport still owns a live socket; the client thread
    // is still blocked reading, so a fresh publish reaches it.
    transport.publish(&framed(b"pong"));
    while transport.write().unwrap() == 0 {}

    client_thread.join().unwrap();
}
