//! Retrieval strategies that populate a proof's content.
//!
//! Each protocol implements [`Fetcher`]. Socket-based fetchers accept an
//! optional pre-established [`Connection`] and otherwise dial their own,
//! bounded by the deadline in [`FetchOptions`].

pub mod conn;
pub mod gemini;
pub mod gopher;
pub mod http;
pub mod tcp;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProofError, Result};
use crate::proof::ProofData;

pub use conn::Connection;
pub use gemini::GeminiFetcher;
pub use gopher::GopherFetcher;
pub use http::HttpFetcher;
pub use tcp::TcpFetcher;

/// Default bound on a whole fetch exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on retrieved content.
pub const DEFAULT_MAX_CONTENT_LEN: usize = 1024 * 1024;

/// Wire protocol a fetcher speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Gemini,
    Gopher,
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "HTTP"),
            Self::Gemini => write!(f, "Gemini"),
            Self::Gopher => write!(f, "Gopher"),
            Self::Tcp => write!(f, "TCP"),
        }
    }
}

/// Settings shared by every fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bound on the whole exchange; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Largest body accepted.
    pub max_content_len: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            max_content_len: DEFAULT_MAX_CONTENT_LEN,
        }
    }
}

/// A retrieval strategy. On success it writes the proof's content; on
/// failure it leaves the proof alone and returns a protocol-tagged error.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, proof: &mut ProofData) -> Result<()>;
}

impl<F> Fetcher for F
where
    F: Fn(&mut ProofData) -> Result<()> + Send + Sync,
{
    fn fetch(&self, proof: &mut ProofData) -> Result<()> {
        self(proof)
    }
}

/// Build a fetcher from a closure, pinning its signature for inference.
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&mut ProofData) -> Result<()> + Send + Sync,
{
    f
}

/// Pick the fetcher matching a URL's scheme.
///
/// `tcp://host:port` URLs become a raw TCP fetch that sends `request`
/// verbatim; other schemes ignore it.
pub fn for_url(
    url: &Url,
    options: &FetchOptions,
    request: Option<&str>,
) -> Result<Arc<dyn Fetcher>> {
    match url.scheme() {
        "http" | "https" => Ok(Arc::new(HttpFetcher::new(options.clone()))),
        "gemini" => Ok(Arc::new(GeminiFetcher::new(options.clone())?)),
        "gopher" => Ok(Arc::new(GopherFetcher::new(options.clone()))),
        "tcp" => {
            let host = url
                .host_str()
                .ok_or_else(|| ProofError::Config(format!("TCP URL has no host: {url}")))?;
            let port = url
                .port()
                .ok_or_else(|| ProofError::Config(format!("TCP URL has no port: {url}")))?;
            Ok(Arc::new(TcpFetcher::new(
                format!("{host}:{port}"),
                request.unwrap_or_default(),
                options.clone(),
            )))
        }
        other => Err(ProofError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::{self, Cursor, Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::sync::{Arc, Mutex};
    use std::thread::{self, JoinHandle};

    use super::Connection;

    /// Accept one loopback connection, read the request until `until` has
    /// been seen (nothing if empty), answer with `response` and close.
    /// The handle yields the request bytes.
    pub(crate) fn serve_once(
        response: impl Into<Vec<u8>>,
        until: &'static [u8],
    ) -> (SocketAddr, JoinHandle<Vec<u8>>) {
        let response = response.into();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !until.is_empty() && !request.windows(until.len()).any(|w| w == until) {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(&response).unwrap();
            request
        });
        (addr, handle)
    }

    /// In-memory connection: reads come from a canned response, writes are
    /// captured for inspection.
    pub(crate) struct MockConn {
        input: Cursor<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl MockConn {
        pub(crate) fn new(response: impl Into<Vec<u8>>) -> Self {
            Self {
                input: Cursor::new(response.into()),
                written: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn written(&self) -> Arc<Mutex<Vec<u8>>> {
            Arc::clone(&self.written)
        }
    }

    impl Read for MockConn {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for MockConn {}
}
