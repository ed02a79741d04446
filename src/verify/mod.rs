//! Signature verification, keyed by signature kind.
//!
//! The proof controller never calls a verification algorithm directly. It
//! looks up the [`Verifier`] registered for a proof's [`SignatureKind`] in a
//! [`VerifierRegistry`], so adding a scheme means adding a variant and a
//! registration, not touching the controller.

pub mod openpgp;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Signature scheme used by a proof.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SignatureKind {
    /// OpenPGP armored cleartext signature.
    #[default]
    Pgp,
}

impl SignatureKind {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pgp" | "openpgp" | "gpg" => Some(Self::Pgp),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pgp => write!(f, "pgp"),
        }
    }
}

/// A verifier checks a signed message against a public key.
///
/// Implementations are pure: the result depends only on the message, the
/// key and the reference time used for key-validity checks.
pub trait Verifier: Send + Sync {
    /// The signature kind this verifier handles.
    fn kind(&self) -> SignatureKind;

    /// Verify `message` against `public_key` as of `at`.
    fn verify(&self, message: &[u8], public_key: &[u8], at: DateTime<Utc>) -> Result<()>;
}

/// Dispatch table from signature kind to verifier.
pub struct VerifierRegistry {
    verifiers: HashMap<SignatureKind, Box<dyn Verifier>>,
}

impl VerifierRegistry {
    /// Create a registry with all built-in verifiers registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(openpgp::PgpVerifier));
        registry
    }

    /// Create a registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            verifiers: HashMap::new(),
        }
    }

    /// Register a verifier, replacing any previous one for the same kind.
    pub fn register(&mut self, verifier: Box<dyn Verifier>) {
        self.verifiers.insert(verifier.kind(), verifier);
    }

    pub fn get(&self, kind: SignatureKind) -> Option<&dyn Verifier> {
        self.verifiers.get(&kind).map(|v| v.as_ref())
    }

    /// Kinds with a registered verifier.
    pub fn kinds(&self) -> Vec<SignatureKind> {
        self.verifiers.keys().copied().collect()
    }
}

impl Default for VerifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VerifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
