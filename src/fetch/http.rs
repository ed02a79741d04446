use super::conn;
use super::{FetchOptions, Fetcher, Protocol};
use crate::error::{ProofError, Result};
use crate::proof::ProofData;

/// Fetches proofs with an HTTP GET of the proof URL.
///
/// Any 2xx response body becomes the content; other statuses fail.
pub struct HttpFetcher {
    agent: ureq::Agent,
    options: FetchOptions,
}

impl HttpFetcher {
    /// A fetcher with its own agent, bounded by `options.timeout`.
    pub fn new(options: FetchOptions) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            options,
        }
    }

    /// A fetcher using a caller-configured agent. The agent's own timeouts
    /// apply; `options.timeout` is not layered on top.
    pub fn with_agent(agent: ureq::Agent, options: FetchOptions) -> Self {
        Self { agent, options }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, proof: &mut ProofData) -> Result<()> {
        let url = proof.url().as_str();
        tracing::debug!(%url, "sending HTTP request");

        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(ProofError::Status {
                    protocol: Protocol::Http,
                    status: code.to_string(),
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(ProofError::Http(Box::new(transport)))
            }
        };

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(ProofError::Status {
                protocol: Protocol::Http,
                status: status.to_string(),
            });
        }

        let body = conn::read_body(
            &mut response.into_reader(),
            self.options.max_content_len,
            Protocol::Http,
            false,
        )?;
        tracing::debug!(%url, status, bytes = body.len(), "HTTP response");
        proof.set_content(body);
        Ok(())
    }
}
