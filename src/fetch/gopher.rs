use std::borrow::Cow;
use std::io::Write;

use percent_encoding::percent_decode_str;

use super::conn::{self, Bounded, Connection, Deadline, Preset};
use super::{FetchOptions, Fetcher, Protocol};
use crate::error::{ProofError, Result};
use crate::proof::ProofData;

pub const DEFAULT_PORT: u16 = 70;

/// Fetches proofs over Gopher (RFC 1436).
///
/// The decoded URL path is sent as the selector, `/` when empty. Gopher has no
/// status line, so whatever the server sends back is the content.
pub struct GopherFetcher {
    options: FetchOptions,
    preset: Preset,
}

impl GopherFetcher {
    pub fn new(options: FetchOptions) -> Self {
        Self {
            options,
            preset: Preset::default(),
        }
    }

    /// Talk over `conn` on the next fetch instead of dialing.
    pub fn with_connection(mut self, conn: impl Connection + 'static) -> Self {
        self.preset = Preset::new(Box::new(conn));
        self
    }

    fn connect(&self, proof: &ProofData, deadline: &Deadline) -> Result<Box<dyn Connection>> {
        if let Some(conn) = self.preset.take() {
            return Ok(conn);
        }
        let url = proof.url();
        let host = conn::host_of(url, Protocol::Gopher)?;
        let port = url.port().unwrap_or(DEFAULT_PORT);
        tracing::debug!(%host, port, "dialing Gopher server");

        let tcp = conn::dial(&host, port, deadline).map_err(|source| ProofError::Connect {
            protocol: Protocol::Gopher,
            source,
        })?;
        Ok(Box::new(tcp))
    }
}

impl Fetcher for GopherFetcher {
    fn fetch(&self, proof: &mut ProofData) -> Result<()> {
        let scheme = proof.url().scheme();
        if scheme != "gopher" {
            return Err(ProofError::InvalidScheme {
                protocol: Protocol::Gopher,
                scheme: scheme.to_string(),
            });
        }

        let deadline = Deadline::after(self.options.timeout);
        let mut stream = Bounded::new(self.connect(proof, &deadline)?, deadline);

        let mut request = selector(proof).into_owned();
        request.extend_from_slice(b"\r\n");
        stream
            .write_all(&request)
            .and_then(|()| stream.flush())
            .map_err(|source| ProofError::Request {
                protocol: Protocol::Gopher,
                source,
            })?;

        let body =
            conn::read_body(&mut stream, self.options.max_content_len, Protocol::Gopher, false)?;
        tracing::debug!(url = %proof.url(), bytes = body.len(), "Gopher response");
        proof.set_content(body);
        Ok(())
    }
}

/// Selectors go over the wire as raw bytes, so `%20` and friends are decoded.
fn selector(proof: &ProofData) -> Cow<'_, [u8]> {
    match proof.url().path() {
        "" => Cow::Borrowed(&b"/"[..]),
        path => percent_decode_str(path).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{serve_once, MockConn};
    use url::Url;

    fn sent_selector(url: &str) -> Vec<u8> {
        let conn = MockConn::new("content");
        let written = conn.written();
        let fetcher = GopherFetcher::new(FetchOptions::default()).with_connection(conn);
        let mut proof = ProofData::new(Url::parse(url).unwrap());
        fetcher.fetch(&mut proof).unwrap();
        let sent = written.lock().unwrap().clone();
        sent
    }

    #[test]
    fn empty_path_sends_root_selector() {
        assert_eq!(sent_selector("gopher://example.org"), b"/\r\n");
    }

    #[test]
    fn path_is_sent_verbatim() {
        assert_eq!(
            sent_selector("gopher://example.org/0/proof.txt"),
            b"/0/proof.txt\r\n"
        );
    }

    #[test]
    fn encoded_path_is_decoded_into_selector() {
        assert_eq!(
            sent_selector("gopher://example.org/0/my proof.txt"),
            b"/0/my proof.txt\r\n"
        );
        assert_eq!(
            sent_selector("gopher://example.org/7/search%3Fq%3Dalice"),
            b"/7/search?q=alice\r\n"
        );
    }

    #[test]
    fn whole_stream_becomes_content() {
        let fetcher = GopherFetcher::new(FetchOptions::default())
            .with_connection(MockConn::new("line one\r\nline two\r\n.\r\n"));
        let mut proof = ProofData::new(Url::parse("gopher://example.org/").unwrap());
        fetcher.fetch(&mut proof).unwrap();
        assert_eq!(proof.content(), b"line one\r\nline two\r\n.\r\n");
    }

    #[test]
    fn wrong_scheme_fails_before_io() {
        let conn = MockConn::new("content");
        let written = conn.written();
        let fetcher = GopherFetcher::new(FetchOptions::default()).with_connection(conn);
        let mut proof = ProofData::new(Url::parse("gemini://example.org/").unwrap());
        let result = fetcher.fetch(&mut proof);
        assert!(matches!(
            result,
            Err(ProofError::InvalidScheme { protocol: Protocol::Gopher, .. })
        ));
        assert!(written.lock().unwrap().is_empty());
        assert!(proof.content().is_empty());
    }

    #[test]
    fn fetches_over_loopback() {
        let (addr, server) = serve_once("signed proof", b"\r\n");
        let url = Url::parse(&format!("gopher://{addr}/proof")).unwrap();
        let mut proof = ProofData::new(url);

        GopherFetcher::new(FetchOptions::default())
            .fetch(&mut proof)
            .unwrap();

        assert_eq!(server.join().unwrap(), b"/proof\r\n");
        assert_eq!(proof.content(), b"signed proof");
    }
}
