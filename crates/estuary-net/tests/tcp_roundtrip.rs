use std::{
    io::{Read, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use estuary_net::{BidirectionalComponent, socket, transport::TcpTransport};
use estuary_protocol::{HeaderWidth, LengthPrefixed};
use mio::{Events, Interest, Poll, Token};

fn framed(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Ported from `flux-network/tests/tcp_roundtrip.rs`'s shape (a listener
/// thread and a connector thread, each polling until its expected message
/// arrives), adapted to drive a single [`BidirectionalComponent`] through
/// its own `mio::Poll` instead of `TcpConnector`.
#[test]
fn tcp_roundtrip_via_length_prefixed_framing() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let mut listener = socket::listen(bind_addr).unwrap();
    let server_addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut poll = Poll::new().unwrap();
        poll.registry().register(&mut listener, Token(0), Interest::READABLE).unwrap();
        let mut events = Events::with_capacity(8);

        let accepted = loop {
            poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
            if let Ok((stream, _)) = listener.accept() {
                break stream;
            }
        };

        let stream_token = Token(1);
        let mut transport = TcpTransport::new(accepted, 4096).unwrap();
        poll.registry().register(transport.socket_mut(), stream_token, Interest::READABLE).unwrap();
        let mut component =
            BidirectionalComponent::new(transport, LengthPrefixed::new(HeaderWidth::Two, 1024), stream_token);

        let mut received = None;
        while received.is_none() {
            poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
            for ev in events.iter() {
                if ev.token() == stream_token && ev.is_readable() {
                    let mut out = Vec::new();
                    let mut discard = Vec::new();
                    component.on_readable(poll.registry(), &mut |m| out.push(m.data.to_vec()), &mut discard);
                    if let Some(msg) = out.into_iter().next() {
                        received = Some(msg);
                    }
                }
            }
        }
        assert_eq!(received.unwrap(), b"ping".to_vec());

        component.publish(poll.registry(), &framed(b"pong")).unwrap();
        let mut drained = false;
        while !drained {
            poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
            for ev in events.iter() {
                if ev.token() == stream_token && ev.is_writable() {
                    let mut discard = Vec::new();
                    component.on_writable(poll.registry(), &mut discard);
                    drained = true;
                }
            }
        }
    });

    thread::sleep(Duration::from_millis(20));
    let mut client = TcpStream::connect(server_addr).unwrap();
    client.write_all(&framed(b"ping")).unwrap();

    let mut header = [0u8; 2];
    client.read_exact(&mut header).unwrap();
    let len = u16::from_be_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    client.read_exact(&mut payload).unwrap();
    assert_eq!(payload, b"pong".to_vec());

    server.join().unwrap();
}
