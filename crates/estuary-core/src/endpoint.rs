use std::{
    fmt,
    net::{SocketAddr, SocketAddrV4, SocketAddrV6},
    path::PathBuf,
    str::FromStr,
};

use crate::error::EndpointParseError;

/// Address-family-agnostic socket address.
///
/// Wraps the families the socket layer actually binds/connects to. `len()`
/// mirrors the native `sockaddr` size for the family, which callers use to
/// size raw `libc::sockaddr_storage` conversions in [`crate` module-level
/// socket code (not part of this crate, see `estuary-net::socket`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    Unix(PathBuf),
}

impl Endpoint {
    /// Size in bytes of the native `sockaddr` this endpoint corresponds to.
    pub fn len(&self) -> usize {
        match self {
            Endpoint::V4(_) => size_of::<libc::sockaddr_in>(),
            Endpoint::V6(_) => size_of::<libc::sockaddr_in6>(),
            Endpoint::Unix(path) => {
                size_of::<libc::sa_family_t>() + path.as_os_str().len() + 1
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Endpoint::V4(v4) => Some(SocketAddr::V4(*v4)),
            Endpoint::V6(v6) => Some(SocketAddr::V6(*v6)),
            Endpoint::Unix(_) => None,
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Endpoint::V4(v4),
            SocketAddr::V6(v6) => Endpoint::V6(v6),
        }
    }
}

impl fmt::Display for Endpoint {
    /// IPv4 as dotted decimal with `:port`; IPv6 bracketed as `[addr]:port`;
    /// Unix path rendered as-is.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::V4(v4) => write!(f, "{v4}"),
            Endpoint::V6(v6) => write!(f, "[{}]:{}", v6.ip(), v6.port()),
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(stripped) = s.strip_prefix('/') {
            let _ = stripped;
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }
        let addr: SocketAddr =
            s.parse().map_err(|_| EndpointParseError::Malformed(s.to_owned()))?;
        Ok(Endpoint::from(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_round_trips_through_display() {
        let ep: Endpoint = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(ep.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn v6_renders_bracketed() {
        let ep: Endpoint = "[::1]:9".parse().unwrap();
        assert_eq!(ep.to_string(), "[::1]:9");
    }

    #[test]
    fn unix_path_passes_through() {
        let ep: Endpoint = "/tmp/sock.sock".parse().unwrap();
        assert_eq!(ep.to_string(), "/tmp/sock.sock");
    }

    #[test]
    fn len_matches_family_sockaddr_size() {
        let ep: Endpoint = "127.0.0.1:1".parse().unwrap();
        assert_eq!(ep.len(), size_of::<libc::sockaddr_in>());
        let ep6: Endpoint = "[::1]:1".parse().unwrap();
        assert_eq!(ep6.len(), size_of::<libc::sockaddr_in6>());
    }
}
