use std::{
    io::{self, Read, Write},
    sync::Arc,
};

use estuary_core::config::{TlsConfig, TlsVersion};
use rustls::pki_types::{CertificateDer, ServerName};

use crate::transport::TcpTransport;

/// One step of the handshake state machine spec.md §4.3 describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    Done,
    WantRead,
    WantWrite,
    Fatal,
}

enum Side {
    Server(rustls::ServerConnection),
    Client(rustls::ClientConnection),
}

/// What a post-handshake session can expose, per spec.md §4.3.
///
/// `rustls` does not itself parse X.509 subject/issuer/serial/SAN fields out
/// of the DER it hands back — that needs a dedicated certificate parser,
/// which is out of scope here (spec.md §1 puts general-purpose parsing
/// libraries out of tree). This surfaces everything `rustls` exposes
/// natively; subject/issuer/SAN are left as raw DER for a caller to hand to
/// an X.509 parser if it needs them.
#[derive(Debug, Clone)]
pub struct PeerCertificateInfo {
    pub chain: Vec<Vec<u8>>,
    pub negotiated_cipher_suite: Option<String>,
    pub protocol_version: Option<String>,
    pub alpn_protocol: Option<Vec<u8>>,
}

/// Wraps a [`TcpTransport`] in a `rustls` session, driving the handshake
/// and read/write paths through the sync `read_tls`/`write_tls`/
/// `process_new_packets` API — chosen because it maps directly onto
/// spec.md §4.3's `Done`/`WantRead`/`WantWrite`/`Fatal` states without
/// pulling in an async runtime this reactor doesn't otherwise use.
pub struct TlsTransport {
    transport: TcpTransport,
    side: Side,
}

impl TlsTransport {
    pub fn server(transport: TcpTransport, config: Arc<rustls::ServerConfig>) -> io::Result<Self> {
        let conn = rustls::ServerConnection::new(config)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self { transport, side: Side::Server(conn) })
    }

    pub fn client(
        transport: TcpTransport,
        config: Arc<rustls::ClientConfig>,
        server_name: ServerName<'static>,
    ) -> io::Result<Self> {
        let conn = rustls::ClientConnection::new(config, server_name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self { transport, side: Side::Client(conn) })
    }

    fn is_handshaking(&self) -> bool {
        match &self.side {
            Side::Server(c) => c.is_handshaking(),
            Side::Client(c) => c.is_handshaking(),
        }
    }

    fn wants_read(&self) -> bool {
        match &self.side {
            Side::Server(c) => c.wants_read(),
            Side::Client(c) => c.wants_read(),
        }
    }

    /// Whether `rustls` has ciphertext (handshake or application data)
    /// queued to go out over the socket.
    pub fn wants_write(&self) -> bool {
        match &self.side {
            Side::Server(c) => c.wants_write(),
            Side::Client(c) => c.wants_write(),
        }
    }

    /// The socket backing this session, for reactor (de)registration.
    pub fn socket_mut(&mut self) -> &mut mio::net::TcpStream {
        self.transport.socket_mut()
    }

    /// The plaintext pipe [`TlsTransport::read`] decrypts into.
    pub fn input(&self) -> &estuary_core::Pipe {
        self.transport.input()
    }

    pub fn input_mut(&mut self) -> &mut estuary_core::Pipe {
        self.transport.input_mut()
    }

    fn write_tls(&mut self) -> io::Result<usize> {
        let socket = self.transport.socket_mut();
        match &mut self.side {
            Side::Server(c) => c.write_tls(socket),
            Side::Client(c) => c.write_tls(socket),
        }
    }

    fn read_tls(&mut self) -> io::Result<usize> {
        let socket = self.transport.socket_mut();
        match &mut self.side {
            Side::Server(c) => c.read_tls(socket),
            Side::Client(c) => c.read_tls(socket),
        }
    }

    fn process_new_packets(&mut self) -> Result<(), rustls::Error> {
        match &mut self.side {
            Side::Server(c) => c.process_new_packets().map(drop),
            Side::Client(c) => c.process_new_packets().map(drop),
        }
    }

    /// Drives one non-blocking step of the handshake. Called repeatedly by
    /// [`estuary_protocol::HandshakeProtocol`] via its `message_size` poll,
    /// exactly as spec.md §4.3 step 3 describes.
    pub fn do_handshake(&mut self) -> HandshakeStatus {
        if !self.is_handshaking() {
            return HandshakeStatus::Done;
        }

        if self.wants_write() {
            match self.write_tls() {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return HandshakeStatus::WantWrite;
                }
                Err(_) => return HandshakeStatus::Fatal,
            }
        }

        if self.wants_read() {
            match self.read_tls() {
                Ok(0) => return HandshakeStatus::Fatal,
                Ok(_) => {
                    if self.process_new_packets().is_err() {
                        return HandshakeStatus::Fatal;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return HandshakeStatus::WantRead;
                }
                Err(_) => return HandshakeStatus::Fatal,
            }
        }

        if !self.is_handshaking() {
            HandshakeStatus::Done
        } else if self.wants_write() {
            HandshakeStatus::WantWrite
        } else {
            HandshakeStatus::WantRead
        }
    }

    /// Post-handshake read: pulls fresh ciphertext off the wire, then
    /// drains whatever plaintext `rustls` already had buffered from a
    /// previous `process_new_packets` call. Spec.md §4.4 calls out this
    /// second drain explicitly — without it, data the reactor already
    /// delivered to the TLS session but didn't hand to the application
    /// would only surface on the *next* readiness event, stalling the
    /// connection under bursty traffic.
    pub fn read(&mut self) -> io::Result<usize> {
        let mut total = 0;
        match self.read_tls() {
            Ok(0) => return Ok(0),
            Ok(_) => {
                if self.process_new_packets().is_err() {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "tls record error"));
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(err),
        }

        loop {
            let chunk = 8 * 1024;
            let buf = self.transport.input_mut().allocate_back(chunk);
            let n = match &mut self.side {
                Side::Server(c) => c.reader().read(buf),
                Side::Client(c) => c.reader().read(buf),
            };
            match n {
                Ok(0) => {
                    self.transport.input_mut().free_back(chunk);
                    break;
                }
                Ok(n) => {
                    self.transport.input_mut().free_back(chunk - n);
                    total += n;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.transport.input_mut().free_back(chunk);
                    break;
                }
                Err(err) => {
                    self.transport.input_mut().free_back(chunk);
                    return Err(err);
                }
            }
        }
        Ok(total)
    }

    pub fn publish(&mut self, data: &[u8]) -> io::Result<()> {
        let writer_result = match &mut self.side {
            Side::Server(c) => c.writer().write_all(data),
            Side::Client(c) => c.writer().write_all(data),
        };
        writer_result
    }

    /// Flushes ciphertext queued by [`TlsTransport::publish`] onto the
    /// socket.
    pub fn write(&mut self) -> io::Result<usize> {
        if !self.wants_write() {
            return Ok(0);
        }
        self.write_tls()
    }

    /// The negotiated ALPN protocol, independent of whether a peer
    /// certificate chain is available (e.g. a server with no client-auth
    /// requirement has no peer chain to report, but still negotiates
    /// ALPN).
    pub fn alpn_protocol(&self) -> Option<Vec<u8>> {
        match &self.side {
            Side::Server(c) => c.alpn_protocol().map(<[u8]>::to_vec),
            Side::Client(c) => c.alpn_protocol().map(<[u8]>::to_vec),
        }
    }

    pub fn peer_certificate_info(&self) -> Option<PeerCertificateInfo> {
        let (chain, suite, version, alpn): (
            Option<&[CertificateDer<'static>]>,
            _,
            _,
            Option<Vec<u8>>,
        ) = match &self.side {
            Side::Server(c) => (
                c.peer_certificates(),
                c.negotiated_cipher_suite(),
                c.protocol_version(),
                c.alpn_protocol().map(<[u8]>::to_vec),
            ),
            Side::Client(c) => (
                c.peer_certificates(),
                c.negotiated_cipher_suite(),
                c.protocol_version(),
                c.alpn_protocol().map(<[u8]>::to_vec),
            ),
        };
        let chain = chain?;
        Some(PeerCertificateInfo {
            chain: chain.iter().map(|c| c.as_ref().to_vec()).collect(),
            negotiated_cipher_suite: suite.map(|s| format!("{:?}", s.suite())),
            protocol_version: version.map(|v| format!("{v:?}")),
            alpn_protocol: alpn,
        })
    }

    pub fn close(&mut self) {
        match &mut self.side {
            Side::Server(c) => c.send_close_notify(),
            Side::Client(c) => c.send_close_notify(),
        }
        self.transport.close();
    }
}

static TLS12_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS12];
static TLS13_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

fn protocol_versions(cfg: &TlsConfig) -> &'static [&'static rustls::SupportedProtocolVersion] {
    match (cfg.min_version, cfg.max_version) {
        (Some(TlsVersion::Tls12), Some(TlsVersion::Tls12)) => TLS12_ONLY,
        (Some(TlsVersion::Tls13), Some(TlsVersion::Tls13)) => TLS13_ONLY,
        _ => rustls::DEFAULT_VERSIONS,
    }
}

/// Builds a server TLS context from [`TlsConfig`], reading the certificate
/// chain and private key from the paths it names.
///
/// # Errors
/// Returns an error if the cert/key files are missing or malformed, or if
/// `rustls` rejects the resulting configuration (e.g. an incompatible
/// version range).
pub fn server_config(cfg: &TlsConfig) -> io::Result<Arc<rustls::ServerConfig>> {
    let cert_path = cfg
        .cert_chain_path
        .as_deref()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing cert_chain_path"))?;
    let key_path = cfg
        .private_key_path
        .as_deref()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing private_key_path"))?;

    let cert_chain: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut io::BufReader::new(std::fs::File::open(cert_path)?))
            .collect::<Result<_, _>>()?;
    let key_bytes = std::fs::read(key_path)?;
    let key = rustls_pemfile::private_key(&mut io::BufReader::new(key_bytes.as_slice()))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found"))?;

    let builder = rustls::ServerConfig::builder_with_protocol_versions(protocol_versions(cfg));
    let mut server_config = builder
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if !cfg.alpn_protocols.is_empty() {
        server_config.alpn_protocols.clone_from(&cfg.alpn_protocols);
    }

    Ok(Arc::new(server_config))
}

/// Builds a client TLS context from [`TlsConfig`], trusting the system's
/// webpki root store unless `ca_bundle_path` names a custom one.
pub fn client_config(cfg: &TlsConfig) -> io::Result<Arc<rustls::ClientConfig>> {
    let mut roots = rustls::RootCertStore::empty();
    if let Some(bundle) = &cfg.ca_bundle_path {
        for cert in rustls_pemfile::certs(&mut io::BufReader::new(std::fs::File::open(bundle)?)) {
            let _ = roots.add(cert?);
        }
    } else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    let builder = rustls::ClientConfig::builder_with_protocol_versions(protocol_versions(cfg));
    let mut client_config = builder.with_root_certificates(roots).with_no_client_auth();

    if !cfg.alpn_protocols.is_empty() {
        client_config.alpn_protocols.clone_from(&cfg.alpn_protocols);
    }

    Ok(Arc::new(client_config))
}
