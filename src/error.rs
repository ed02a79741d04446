use thiserror::Error;

use crate::fetch::Protocol;
use crate::verify::SignatureKind;

pub type Result<T> = std::result::Result<T, ProofError>;

#[derive(Error, Debug)]
pub enum ProofError {
    #[error("Configuration error: missing fetch function")]
    MissingFetcher,

    #[error("Configuration error: missing public key")]
    MissingPublicKey,

    #[error("Configuration error: missing content")]
    MissingContent,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No fetcher available for URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid URL scheme for {protocol}: {scheme}")]
    InvalidScheme { protocol: Protocol, scheme: String },

    #[error("Failed to connect to {protocol} server: {source}")]
    Connect {
        protocol: Protocol,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to establish TLS connection ({protocol}): {message}")]
    Tls { protocol: Protocol, message: String },

    #[error("Failed to send {protocol} request: {source}")]
    Request {
        protocol: Protocol,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {protocol} response: {source}")]
    Response {
        protocol: Protocol,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {protocol} response header: {header:?}")]
    MalformedHeader { protocol: Protocol, header: String },

    #[error("Unsuccessful {protocol} response: {status}")]
    Status { protocol: Protocol, status: String },

    #[error("{protocol} response exceeds {limit} bytes")]
    ContentTooLarge { protocol: Protocol, limit: usize },

    #[error("HTTP transport error: {0}")]
    Http(Box<ureq::Transport>),

    #[error("Unsupported signature type: {0}")]
    UnsupportedSignature(SignatureKind),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Public key not valid at reference time: {0}")]
    KeyNotValid(String),

    #[error("OpenPGP error: {0}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl ProofError {
    pub fn exit_code(&self) -> i32 {
        2
    }

    /// The protocol a retrieval error originated from, if any.
    pub fn protocol(&self) -> Option<Protocol> {
        match self {
            Self::InvalidScheme { protocol, .. }
            | Self::Connect { protocol, .. }
            | Self::Tls { protocol, .. }
            | Self::Request { protocol, .. }
            | Self::Response { protocol, .. }
            | Self::MalformedHeader { protocol, .. }
            | Self::Status { protocol, .. }
            | Self::ContentTooLarge { protocol, .. } => Some(*protocol),
            Self::Http(_) => Some(Protocol::Http),
            _ => None,
        }
    }
}
