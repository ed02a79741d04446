use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use super::conn::{self, Bounded, Connection, Deadline, Preset};
use super::{FetchOptions, Fetcher, Protocol};
use crate::error::{ProofError, Result};
use crate::proof::ProofData;

pub const DEFAULT_PORT: u16 = 1965;

/// Two status digits, a space, up to 1024 bytes of meta, CRLF.
const MAX_HEADER_LEN: usize = 2 + 1 + 1024 + 2;

/// Fetches proofs over Gemini.
///
/// Sends `<url>\r\n` over TLS and accepts any `2x` response; everything
/// after the header line becomes the proof content.
pub struct GeminiFetcher {
    options: FetchOptions,
    tls: Arc<ClientConfig>,
    preset: Preset,
}

impl GeminiFetcher {
    /// A fetcher that trusts the webpki root store.
    pub fn new(options: FetchOptions) -> Result<Self> {
        Ok(Self::with_tls_config(options, default_tls_config()?))
    }

    /// A fetcher with caller-supplied TLS settings, e.g. a verifier that
    /// pins a capsule's self-signed certificate.
    pub fn with_tls_config(options: FetchOptions, tls: Arc<ClientConfig>) -> Self {
        Self {
            options,
            tls,
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
        let host = conn::host_of(url, Protocol::Gemini)?;
        let port = url.port().unwrap_or(DEFAULT_PORT);
        tracing::debug!(%host, port, "dialing Gemini server");

        let mut tcp = conn::dial(&host, port, deadline).map_err(|source| ProofError::Connect {
            protocol: Protocol::Gemini,
            source,
        })?;
        let tls_error = |message: String| ProofError::Tls {
            protocol: Protocol::Gemini,
            message,
        };

        let name = ServerName::try_from(host).map_err(|e| tls_error(e.to_string()))?;
        let mut session = ClientConnection::new(Arc::clone(&self.tls), name)
            .map_err(|e| tls_error(e.to_string()))?;

        let left = deadline.remaining().map_err(|e| tls_error(e.to_string()))?;
        tcp.set_timeout(left).map_err(|e| tls_error(e.to_string()))?;
        while session.is_handshaking() {
            session
                .complete_io(&mut tcp)
                .map_err(|e| tls_error(e.to_string()))?;
        }

        Ok(Box::new(StreamOwned::new(session, tcp)))
    }
}

impl Fetcher for GeminiFetcher {
    fn fetch(&self, proof: &mut ProofData) -> Result<()> {
        let scheme = proof.url().scheme();
        if scheme != "gemini" {
            return Err(ProofError::InvalidScheme {
                protocol: Protocol::Gemini,
                scheme: scheme.to_string(),
            });
        }

        let deadline = Deadline::after(self.options.timeout);
        let mut stream = Bounded::new(self.connect(proof, &deadline)?, deadline);

        let request = format!("{}\r\n", proof.url());
        stream
            .write_all(request.as_bytes())
            .and_then(|()| stream.flush())
            .map_err(|source| ProofError::Request {
                protocol: Protocol::Gemini,
                source,
            })?;

        let mut reader = BufReader::new(stream);
        let header = read_header(&mut reader)?;
        let status = status_code(&header)?;
        if !status.starts_with('2') {
            return Err(ProofError::Status {
                protocol: Protocol::Gemini,
                status: header.trim().to_string(),
            });
        }

        let body =
            conn::read_body(&mut reader, self.options.max_content_len, Protocol::Gemini, true)?;
        tracing::debug!(url = %proof.url(), status, bytes = body.len(), "Gemini response");
        proof.set_content(body);
        Ok(())
    }
}

/// Read the response header line, newline included.
fn read_header(reader: &mut impl BufRead) -> Result<String> {
    let mut line = Vec::new();
    reader
        .by_ref()
        .take(MAX_HEADER_LEN as u64)
        .read_until(b'\n', &mut line)
        .map_err(|source| ProofError::Response {
            protocol: Protocol::Gemini,
            source,
        })?;

    if !line.ends_with(b"\n") {
        if line.len() >= MAX_HEADER_LEN {
            return Err(ProofError::MalformedHeader {
                protocol: Protocol::Gemini,
                header: format!("header exceeds {MAX_HEADER_LEN} bytes"),
            });
        }
        return Err(ProofError::Response {
            protocol: Protocol::Gemini,
            source: std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before end of header",
            ),
        });
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// The two-digit status at the start of a header.
fn status_code(header: &str) -> Result<&str> {
    header
        .get(..2)
        .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| ProofError::MalformedHeader {
            protocol: Protocol::Gemini,
            header: header.trim_end().to_string(),
        })
}

fn default_tls_config() -> Result<Arc<ClientConfig>> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| ProofError::Tls {
                protocol: Protocol::Gemini,
                message: e.to_string(),
            })?
            .with_root_certificates(roots)
            .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockConn;
    use pretty_assertions::assert_eq;
    use url::Url;

    fn fetch_with(response: &str, url: &str) -> (Result<()>, ProofData, Vec<u8>) {
        let conn = MockConn::new(response);
        let written = conn.written();
        let fetcher = GeminiFetcher::new(FetchOptions::default())
            .unwrap()
            .with_connection(conn);
        let mut proof = ProofData::new(Url::parse(url).unwrap());
        let result = fetcher.fetch(&mut proof);
        let sent = written.lock().unwrap().clone();
        (result, proof, sent)
    }

    #[test]
    fn successful_fetch() {
        let (result, proof, sent) = fetch_with(
            "20 text/gemini\r\nThis is a test content.",
            "gemini://example.com",
        );
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(proof.content(), b"This is a test content.");
        assert_eq!(sent, b"gemini://example.com\r\n");
    }

    #[test]
    fn body_starts_after_header_newline() {
        let (result, proof, _) = fetch_with("20 text/gemini\r\nBODY", "gemini://example.com/proof");
        assert!(result.is_ok());
        assert_eq!(proof.content(), b"BODY");
    }

    #[test]
    fn error_from_server() {
        let (result, proof, _) = fetch_with("51 Not found\r\n", "gemini://example.com");
        match result {
            Err(ProofError::Status { protocol, status }) => {
                assert_eq!(protocol, Protocol::Gemini);
                assert_eq!(status, "51 Not found");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(proof.content().is_empty());
    }

    #[test]
    fn redirect_is_not_success() {
        let (result, _, _) =
            fetch_with("30 gemini://elsewhere.example/\r\n", "gemini://example.com");
        assert!(matches!(result, Err(ProofError::Status { .. })));
    }

    #[test]
    fn short_header_is_malformed() {
        let (result, _, _) = fetch_with("2\r\n", "gemini://example.com");
        assert!(matches!(result, Err(ProofError::MalformedHeader { .. })));

        let (result, _, _) = fetch_with("\n", "gemini://example.com");
        assert!(matches!(result, Err(ProofError::MalformedHeader { .. })));
    }

    #[test]
    fn non_numeric_status_is_malformed() {
        let (result, _, _) = fetch_with("OK text/plain\r\nbody", "gemini://example.com");
        assert!(matches!(result, Err(ProofError::MalformedHeader { .. })));
    }

    #[test]
    fn missing_header_newline_is_response_error() {
        let (result, _, _) = fetch_with("20 text/gemini", "gemini://example.com");
        assert!(matches!(result, Err(ProofError::Response { .. })));
    }

    #[test]
    fn oversized_header_is_malformed() {
        let response = format!("20 {}\r\nbody", "m".repeat(2000));
        let (result, _, _) = fetch_with(&response, "gemini://example.com");
        assert!(matches!(result, Err(ProofError::MalformedHeader { .. })));
    }

    #[test]
    fn wrong_scheme_fails_before_io() {
        let (result, _, sent) = fetch_with("20 text/gemini\r\nBODY", "https://example.com");
        assert!(matches!(
            result,
            Err(ProofError::InvalidScheme { protocol: Protocol::Gemini, .. })
        ));
        assert!(sent.is_empty());
    }

    #[test]
    fn oversized_body_is_rejected() {
        let options = FetchOptions {
            max_content_len: 4,
            ..FetchOptions::default()
        };
        let fetcher = GeminiFetcher::new(options)
            .unwrap()
            .with_connection(MockConn::new("20 text/plain\r\n0123456789"));
        let mut proof = ProofData::new(Url::parse("gemini://example.com").unwrap());
        let result = fetcher.fetch(&mut proof);
        assert!(matches!(result, Err(ProofError::ContentTooLarge { limit: 4, .. })));
        assert!(proof.content().is_empty());
    }
}
