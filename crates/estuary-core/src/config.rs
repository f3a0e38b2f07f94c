use std::time::Duration;

/// Tunables for a single reactor/transport stack.
///
/// No file-format loader is mandated by the spec; embedding binaries decide
/// how to populate this (env, TOML, CLI flags) — same division of
/// responsibility the teacher leaves to code outside `flux-network`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ReactorConfig {
    /// Bytes pulled per `transport.read()` call.
    pub read_chunk_size: usize,
    /// Kernel `SO_SNDBUF`/`SO_RCVBUF` applied to accepted and connected TCP
    /// sockets, if set.
    pub socket_buf_size: Option<usize>,
    /// Interval between outbound reconnect attempts.
    #[cfg_attr(feature = "serde", serde(with = "duration_secs"))]
    pub reconnect_interval: Duration,
    /// Upper bound on a single length-prefixed frame; protocols reject
    /// (fail) a header claiming more than this.
    pub max_frame_size: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 8 * 1024,
            socket_buf_size: None,
            reconnect_interval: Duration::from_secs(2),
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

#[cfg(feature = "serde")]
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// TLS context configuration surface (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub cert_chain_path: Option<std::path::PathBuf>,
    pub private_key_path: Option<std::path::PathBuf>,
    pub ca_bundle_path: Option<std::path::PathBuf>,
    pub alpn_protocols: Vec<Vec<u8>>,
    pub server_name: Option<String>,
    pub min_version: Option<TlsVersion>,
    pub max_version: Option<TlsVersion>,
    /// TLS 1.3 post-handshake client re-authentication.
    pub post_handshake_auth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}
