//! proofcheck: fetch signed proofs and verify them against a known key.
//!
//! A proof is a signed statement published somewhere reachable over HTTP,
//! Gemini, Gopher or raw TCP. A [`Proof`] remembers where it lives, how to
//! fetch it, and how long a successful check stays fresh.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use proofcheck::config::Config;
//!
//! let config = Config::load(Path::new(".proofcheck.toml")).unwrap();
//! let reports = proofcheck::check_all(&config).unwrap();
//! for report in &reports {
//!     println!("{}: verified={}", report.url, report.verified);
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod output;
pub mod proof;
pub mod report;
pub mod verify;

use std::sync::Arc;

use url::Url;

use config::{Config, ProofEntry};
use fetch::FetchOptions;
use output::OutputFormat;
use report::ProofReport;
use verify::VerifierRegistry;

pub use error::{ProofError, Result};
pub use proof::{Proof, ProofData, ProofStatus};
pub use verify::SignatureKind;

/// Build a ready-to-check proof from a config entry: parse the URL, pick
/// the fetcher for its scheme and load the public key.
pub fn build_proof(
    entry: &ProofEntry,
    options: &FetchOptions,
    verifiers: Arc<VerifierRegistry>,
) -> Result<Proof> {
    let url = Url::parse(&entry.url)?;
    let fetcher = fetch::for_url(&url, options, entry.request.as_deref())?;
    let pubkey = std::fs::read(&entry.pubkey).map_err(|e| {
        ProofError::Config(format!(
            "cannot read public key {}: {e}",
            entry.pubkey.display()
        ))
    })?;

    Ok(Proof::new(url, entry.kind, entry.max_age())
        .with_shared_fetcher(fetcher)
        .with_pubkey(pubkey)
        .with_verifiers(verifiers))
}

/// Check every configured proof.
///
/// A proof that fails to fetch or verify is recorded in its report rather
/// than aborting the run.
pub fn check_all(config: &Config) -> Result<Vec<ProofReport>> {
    if config.proofs.is_empty() {
        return Err(ProofError::Config("no proofs configured".into()));
    }

    let options = config.fetch.options();
    let verifiers = Arc::new(VerifierRegistry::default());

    let reports = config
        .proofs
        .iter()
        .map(|entry| match build_proof(entry, &options, Arc::clone(&verifiers)) {
            Ok(proof) => {
                let outcome = proof.check();
                if let Err(e) = &outcome {
                    tracing::warn!(url = %entry.url, error = %e, "proof check failed");
                }
                ProofReport::from_check(&proof, &outcome)
            }
            Err(e) => {
                tracing::warn!(url = %entry.url, error = %e, "proof could not be set up, skipping");
                ProofReport::setup_failed(&entry.url, entry.kind, &e)
            }
        })
        .collect();

    Ok(reports)
}

/// Render check results in the requested format.
pub fn render_report(reports: &[ProofReport], format: OutputFormat) -> Result<String> {
    output::render(reports, format)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::fetch::testing::serve_once;
    use std::path::Path;

    const AUTHOR_KEY: &str = include_str!("../tests/fixtures/pgp/author.pub.asc");
    const OTHER_KEY: &str = include_str!("../tests/fixtures/pgp/other.pub.asc");
    const SIGNED: &str = include_str!("../tests/fixtures/pgp/proof.signed.asc");

    fn entry(url: String, pubkey: &Path) -> ProofEntry {
        ProofEntry {
            url,
            pubkey: pubkey.to_path_buf(),
            kind: SignatureKind::Pgp,
            max_age_secs: 3600,
            request: None,
        }
    }

    #[test]
    fn gopher_proof_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("author.asc");
        std::fs::write(&key, AUTHOR_KEY).unwrap();

        let (addr, server) = serve_once(SIGNED, b"\r\n");
        let config = Config {
            proofs: vec![entry(format!("gopher://{addr}/0/proof.txt"), &key)],
            ..Config::default()
        };

        let reports = check_all(&config).unwrap();
        assert_eq!(server.join().unwrap(), b"/0/proof.txt\r\n");
        assert_eq!(reports.len(), 1);
        assert!(reports[0].verified, "{:?}", reports[0].error);
        assert_eq!(reports[0].content_len, SIGNED.len());
    }

    #[test]
    fn tcp_proof_with_wrong_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("other.asc");
        std::fs::write(&key, OTHER_KEY).unwrap();

        let (addr, server) = serve_once(SIGNED, b"\n");
        let mut proof = entry(format!("tcp://{addr}"), &key);
        proof.request = Some("author\n".into());
        let config = Config {
            proofs: vec![proof],
            ..Config::default()
        };

        let reports = check_all(&config).unwrap();
        assert_eq!(server.join().unwrap(), b"author\n");
        assert!(!reports[0].verified);
        assert!(reports[0].content_sha256.is_some());
        assert!(reports[0].error.as_deref().unwrap().starts_with("Invalid signature"));
    }

    #[test]
    fn setup_failures_are_reported_not_fatal() {
        let config = Config {
            proofs: vec![
                entry("ftp://example.org/proof".into(), Path::new("missing.asc")),
                entry("gemini://example.org/proof".into(), Path::new("does/not/exist.asc")),
            ],
            ..Config::default()
        };

        let reports = check_all(&config).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| !r.verified));
        assert!(reports[0].error.as_deref().unwrap().contains("ftp"));
        assert!(reports[1].error.as_deref().unwrap().contains("public key"));
    }

    #[test]
    fn empty_config_is_an_error() {
        assert!(matches!(
            check_all(&Config::default()),
            Err(ProofError::Config(_))
        ));
    }

    #[test]
    fn http_fetch_then_verify() {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{SIGNED}",
            SIGNED.len()
        );
        let (addr, server) = serve_once(response, b"\r\n\r\n");
        let url = Url::parse(&format!("http://{addr}/proof.txt")).unwrap();

        let proof = Proof::new(url, SignatureKind::Pgp, std::time::Duration::from_secs(60))
            .with_fetcher(fetch::HttpFetcher::new(FetchOptions::default()))
            .with_pubkey(AUTHOR_KEY);

        proof.fetch().unwrap();
        server.join().unwrap();
        proof.verify().unwrap();
        assert!(proof.is_verified());
    }
}
