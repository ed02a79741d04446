//! The proof controller: content, key, freshness and verification state for
//! one signed proof, with the fetch / verify / check lifecycle.
//!
//! All mutation of a [`Proof`] goes through one per-instance mutex, held for
//! the whole of `fetch` (including network I/O) and `verify`. Calls on the
//! same instance serialize; separate instances share nothing.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use proofcheck::fetch::{FetchOptions, GeminiFetcher};
//! use proofcheck::{Proof, SignatureKind};
//!
//! let url = url::Url::parse("gemini://example.org/proof.txt").unwrap();
//! let proof = Proof::new(url, SignatureKind::Pgp, Duration::from_secs(3600))
//!     .with_fetcher(GeminiFetcher::new(FetchOptions::default()).unwrap())
//!     .with_pubkey(std::fs::read("alice.asc").unwrap());
//! proof.check().unwrap();
//! assert!(proof.is_verified());
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use url::Url;

use crate::error::{ProofError, Result};
use crate::fetch::Fetcher;
use crate::verify::{SignatureKind, VerifierRegistry};

/// Sentinel for "never checked" in the lock-free timestamp mirror.
const NEVER: i64 = i64::MIN;

/// The part of a proof a fetcher may read and populate.
#[derive(Debug, Clone)]
pub struct ProofData {
    url: Url,
    content: Vec<u8>,
    pubkey: Vec<u8>,
}

impl ProofData {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            content: Vec::new(),
            pubkey: Vec::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    pub fn pubkey(&self) -> &[u8] {
        &self.pubkey
    }

    pub fn set_pubkey(&mut self, pubkey: Vec<u8>) {
        self.pubkey = pubkey;
    }
}

/// Outcome of the most recent verification attempt, read atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofStatus {
    pub verified: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct ProofState {
    data: ProofData,
    verified: bool,
    last_checked: Option<DateTime<Utc>>,
}

/// A signed proof that can be fetched and verified.
pub struct Proof {
    url: Url,
    kind: SignatureKind,
    max_age: Duration,
    fetcher: Option<Arc<dyn Fetcher>>,
    verifiers: Arc<VerifierRegistry>,
    state: Mutex<ProofState>,
    /// Mirror of `state.last_checked` in nanoseconds, so expiry can be read
    /// without waiting on an in-flight fetch.
    last_checked_nanos: AtomicI64,
}

impl Proof {
    /// A proof that has never been checked, and is therefore stale.
    pub fn new(url: Url, kind: SignatureKind, max_age: Duration) -> Self {
        Self {
            state: Mutex::new(ProofState {
                data: ProofData::new(url.clone()),
                verified: false,
                last_checked: None,
            }),
            url,
            kind,
            max_age,
            fetcher: None,
            verifiers: Arc::new(VerifierRegistry::default()),
            last_checked_nanos: AtomicI64::new(NEVER),
        }
    }

    pub fn with_fetcher<F: Fetcher + 'static>(self, fetcher: F) -> Self {
        self.with_shared_fetcher(Arc::new(fetcher))
    }

    pub fn with_shared_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_pubkey(self, pubkey: impl Into<Vec<u8>>) -> Self {
        self.set_pubkey(pubkey);
        self
    }

    pub fn with_content(self, content: impl Into<Vec<u8>>) -> Self {
        self.lock().data.content = content.into();
        self
    }

    /// Pretend the proof was last checked at `at`.
    pub fn with_last_checked(self, at: DateTime<Utc>) -> Self {
        self.lock().last_checked = Some(at);
        self.last_checked_nanos.store(encode(at), Ordering::Release);
        self
    }

    /// Use a custom verifier table instead of the built-in one.
    pub fn with_verifiers(mut self, verifiers: Arc<VerifierRegistry>) -> Self {
        self.verifiers = verifiers;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn content(&self) -> Vec<u8> {
        self.lock().data.content.clone()
    }

    pub fn pubkey(&self) -> Vec<u8> {
        self.lock().data.pubkey.clone()
    }

    pub fn set_pubkey(&self, pubkey: impl Into<Vec<u8>>) {
        self.lock().data.pubkey = pubkey.into();
    }

    pub fn is_verified(&self) -> bool {
        self.lock().verified
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.lock().last_checked
    }

    pub fn status(&self) -> ProofStatus {
        let state = self.lock();
        ProofStatus {
            verified: state.verified,
            last_checked: state.last_checked,
        }
    }

    /// Retrieve the proof content with the injected fetcher.
    ///
    /// The fetcher works on a draft; stored data changes only if it
    /// succeeds. The instance lock is held for the whole call.
    pub fn fetch(&self) -> Result<()> {
        let fetcher = self.fetcher.as_ref().ok_or(ProofError::MissingFetcher)?;

        let mut state = self.lock();
        let mut draft = state.data.clone();

        tracing::debug!(url = %self.url, "fetching proof");
        match fetcher.fetch(&mut draft) {
            Ok(()) => {
                tracing::debug!(
                    url = %self.url,
                    bytes = draft.content.len(),
                    "fetched proof"
                );
                state.data = draft;
                Ok(())
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "fetch failed");
                Err(e)
            }
        }
    }

    /// Check the stored content's signature against the stored key.
    ///
    /// Records the outcome and the attempt time, even when the key or
    /// content is missing. An unsupported kind is rejected before anything
    /// is recorded.
    pub fn verify(&self) -> Result<()> {
        let verifier = self
            .verifiers
            .get(self.kind)
            .ok_or(ProofError::UnsupportedSignature(self.kind))?;

        let mut state = self.lock();
        let now = Utc::now();

        let outcome = if state.data.pubkey.is_empty() {
            Err(ProofError::MissingPublicKey)
        } else if state.data.content.is_empty() {
            Err(ProofError::MissingContent)
        } else {
            verifier.verify(&state.data.content, &state.data.pubkey, now)
        };

        state.verified = outcome.is_ok();
        state.last_checked = Some(now);
        self.last_checked_nanos.store(encode(now), Ordering::Release);

        match &outcome {
            Ok(()) => tracing::info!(url = %self.url, kind = %self.kind, "proof verified"),
            Err(e) => {
                tracing::info!(url = %self.url, kind = %self.kind, error = %e, "proof not verified")
            }
        }
        outcome
    }

    /// Whether more than `max_age` has passed since the last check.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// `is_expired` against an explicit clock reading. Reaching exactly
    /// `last_checked + max_age` is not yet expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let nanos = self.last_checked_nanos.load(Ordering::Acquire);
        if nanos == NEVER {
            return true;
        }
        let last = DateTime::from_timestamp_nanos(nanos);
        match TimeDelta::from_std(self.max_age)
            .ok()
            .and_then(|age| last.checked_add_signed(age))
        {
            Some(expires) => now > expires,
            None => false,
        }
    }

    /// Fetch if stale, then verify. At most one fetch and, unless the fetch
    /// fails, exactly one verification.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            self.fetch()?;
        }
        self.verify()
    }

    fn lock(&self) -> MutexGuard<'_, ProofState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Proof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proof")
            .field("url", &self.url.as_str())
            .field("kind", &self.kind)
            .field("max_age", &self.max_age)
            .field("has_fetcher", &self.fetcher.is_some())
            .finish_non_exhaustive()
    }
}

fn encode(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or_else(|| {
        if at.timestamp() < 0 {
            NEVER + 1
        } else {
            i64::MAX
        }
    })
}
