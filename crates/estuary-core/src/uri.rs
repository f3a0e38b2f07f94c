use std::collections::BTreeMap;

use url::Url;

use crate::error::UriError;

/// Address family a parsed [`Uri`]'s host resolves to, used by the socket
/// layer to pick a `socket()` family without re-parsing the host string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    Unix,
    Unresolved,
}

/// Case-insensitive multimap over query parameters.
///
/// Keys are stored lower-cased; empty keys and empty values are preserved
/// distinctly from absent ones, per spec.md §6.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMultimap {
    entries: Vec<(String, String)>,
}

impl QueryMultimap {
    fn push(&mut self, key: &str, value: &str) {
        self.entries.push((key.to_lowercase(), value.to_owned()));
    }

    /// First value for `key`, if any (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> {
        let key = key.to_lowercase();
        self.entries.iter().filter(move |(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn default_port_table() -> &'static BTreeMap<&'static str, u16> {
    use std::sync::OnceLock;
    static TABLE: OnceLock<BTreeMap<&'static str, u16>> = OnceLock::new();
    TABLE.get_or_init(|| {
        BTreeMap::from([
            ("http", 80),
            ("https", 443),
            ("ws", 80),
            ("wss", 443),
            ("ftp", 21),
            ("ssh", 22),
        ])
    })
}

/// Parsed URI reference.
///
/// The grammar itself (RFC 3986 tokenizing) is delegated to the `url` crate
/// per spec.md §1's "URI parser is an external collaborator" framing; this
/// type adds the scheme→default-port resolution, the address-family tag,
/// and the case-insensitive query multimap spec.md §6 requires and that
/// `url::Url` does not provide directly.
#[derive(Debug, Clone)]
pub struct Uri {
    scheme: String,
    user_info: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    raw_query: Option<String>,
    parsed_query: QueryMultimap,
    fragment: Option<String>,
    address_family: AddressFamily,
}

impl Uri {
    pub fn parse(s: &str) -> Result<Self, UriError> {
        if let Some(rest) = s.strip_prefix("unix://") {
            return Ok(Self::unix(rest));
        }

        let url = Url::parse(s)?;
        let scheme = url.scheme().to_owned();
        let host = url.host_str().ok_or(UriError::MissingHost)?.to_owned();
        let port = url.port().or_else(|| default_port_table().get(scheme.as_str()).copied());
        let user_info = if url.username().is_empty() && url.password().is_none() {
            None
        } else {
            Some(match url.password() {
                Some(pw) => format!("{}:{}", url.username(), pw),
                None => url.username().to_owned(),
            })
        };

        let mut path = url.path().to_owned();
        if path.is_empty() {
            path = "/".to_owned();
        }

        let raw_query = url.query().map(str::to_owned);
        let mut parsed_query = QueryMultimap::default();
        if let Some(q) = &raw_query {
            for (k, v) in url::form_urlencoded::parse(q.as_bytes()) {
                parsed_query.push(&k, &v);
            }
        }

        let fragment = url.fragment().map(str::to_owned);

        let address_family = if host.parse::<std::net::Ipv4Addr>().is_ok() {
            AddressFamily::Ipv4
        } else if host.parse::<std::net::Ipv6Addr>().is_ok() {
            AddressFamily::Ipv6
        } else {
            AddressFamily::Unresolved
        };

        Ok(Self {
            scheme,
            user_info,
            host,
            port,
            path,
            raw_query,
            parsed_query,
            fragment,
            address_family,
        })
    }

    fn unix(path: &str) -> Self {
        Self {
            scheme: "unix".to_owned(),
            user_info: None,
            host: String::new(),
            port: None,
            path: if path.is_empty() { "/".to_owned() } else { path.to_owned() },
            raw_query: None,
            parsed_query: QueryMultimap::default(),
            fragment: None,
            address_family: AddressFamily::Unix,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn user_info(&self) -> Option<&str> {
        self.user_info.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    pub fn query(&self) -> &QueryMultimap {
        &self.parsed_query
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn address_family(&self) -> AddressFamily {
        self.address_family
    }
}
