use std::io::Write;

use super::conn::{self, Bounded, Connection, Deadline, Preset};
use super::{FetchOptions, Fetcher, Protocol};
use crate::error::{ProofError, Result};
use crate::proof::ProofData;

/// Fetches proofs from a raw TCP service (finger, whois and the like).
///
/// Connects to a fixed `host:port`, writes `request` verbatim if it is not
/// empty, and takes everything the server sends until it closes.
pub struct TcpFetcher {
    address: String,
    request: String,
    options: FetchOptions,
    preset: Preset,
}

impl TcpFetcher {
    pub fn new(
        address: impl Into<String>,
        request: impl Into<String>,
        options: FetchOptions,
    ) -> Self {
        Self {
            address: address.into(),
            request: request.into(),
            options,
            preset: Preset::default(),
        }
    }

    /// Talk over `conn` on the next fetch instead of dialing.
    pub fn with_connection(mut self, conn: impl Connection + 'static) -> Self {
        self.preset = Preset::new(Box::new(conn));
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn connect(&self, deadline: &Deadline) -> Result<Box<dyn Connection>> {
        if let Some(conn) = self.preset.take() {
            return Ok(conn);
        }
        tracing::debug!(address = %self.address, "dialing TCP server");
        let tcp = conn::dial_address(&self.address, deadline).map_err(|source| {
            ProofError::Connect {
                protocol: Protocol::Tcp,
                source,
            }
        })?;
        Ok(Box::new(tcp))
    }
}

impl Fetcher for TcpFetcher {
    fn fetch(&self, proof: &mut ProofData) -> Result<()> {
        let deadline = Deadline::after(self.options.timeout);
        let mut stream = Bounded::new(self.connect(&deadline)?, deadline);

        if !self.request.is_empty() {
            stream
                .write_all(self.request.as_bytes())
                .and_then(|()| stream.flush())
                .map_err(|source| ProofError::Request {
                    protocol: Protocol::Tcp,
                    source,
                })?;
        }

        let body =
            conn::read_body(&mut stream, self.options.max_content_len, Protocol::Tcp, false)?;
        tracing::debug!(address = %self.address, bytes = body.len(), "TCP response");
        proof.set_content(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{serve_once, MockConn};
    use std::net::TcpListener;
    use std::time::Duration;
    use url::Url;

    fn proof() -> ProofData {
        ProofData::new(Url::parse("tcp://127.0.0.1:79").unwrap())
    }

    #[test]
    fn sends_request_and_reads_until_close() {
        let (addr, server) = serve_once("alice's proof\n", b"\r\n");
        let fetcher = TcpFetcher::new(addr.to_string(), "alice\r\n", FetchOptions::default());
        let mut proof = proof();

        fetcher.fetch(&mut proof).unwrap();

        assert_eq!(server.join().unwrap(), b"alice\r\n");
        assert_eq!(proof.content(), b"alice's proof\n");
    }

    #[test]
    fn empty_request_sends_nothing() {
        let conn = MockConn::new("banner proof");
        let written = conn.written();
        let fetcher =
            TcpFetcher::new("127.0.0.1:79", "", FetchOptions::default()).with_connection(conn);
        let mut proof = proof();

        fetcher.fetch(&mut proof).unwrap();

        assert!(written.lock().unwrap().is_empty());
        assert_eq!(proof.content(), b"banner proof");
    }

    #[test]
    fn expired_deadline_fails_without_touching_content() {
        let options = FetchOptions {
            timeout: Some(Duration::ZERO),
            ..FetchOptions::default()
        };
        let fetcher =
            TcpFetcher::new("127.0.0.1:79", "", options).with_connection(MockConn::new("late"));
        let mut proof = proof();

        let result = fetcher.fetch(&mut proof);

        match result {
            Err(ProofError::Response { protocol, source }) => {
                assert_eq!(protocol, Protocol::Tcp);
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(proof.content().is_empty());
    }

    #[test]
    fn refused_connection_is_connect_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let fetcher = TcpFetcher::new(addr.to_string(), "", FetchOptions::default());
        let result = fetcher.fetch(&mut proof());
        assert!(matches!(
            result,
            Err(ProofError::Connect { protocol: Protocol::Tcp, .. })
        ));
    }
}
