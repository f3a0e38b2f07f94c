use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointParseError {
    #[error("malformed endpoint string: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum UriError {
    #[error("underlying grammar error: {0}")]
    Grammar(#[from] url::ParseError),
    #[error("uri has no host")]
    MissingHost,
}

/// Errors raised by the byte-framing contract ([`crate::protocol`] lives in
/// `estuary-protocol`, but the shared failure taxonomy lives here since both
/// the protocol and transport layers need to agree on it).
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("protocol reported a message size ({reported}) larger than the available bytes ({available})")]
    SizeExceedsAvailable { reported: usize, available: usize },
}
