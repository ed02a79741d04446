use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProofError, Result};
use crate::proof::Proof;
use crate::verify::SignatureKind;

/// Result of checking one proof, for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofReport {
    pub url: String,
    pub kind: SignatureKind,
    pub verified: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub content_len: usize,
    /// Hex SHA-256 of the fetched content, if any.
    pub content_sha256: Option<String>,
    pub error: Option<String>,
}

impl ProofReport {
    /// Snapshot a proof after a check.
    pub fn from_check(proof: &Proof, outcome: &Result<()>) -> Self {
        let content = proof.content();
        let status = proof.status();
        Self {
            url: proof.url().to_string(),
            kind: proof.kind(),
            verified: status.verified,
            last_checked: status.last_checked,
            content_len: content.len(),
            content_sha256: (!content.is_empty()).then(|| hex::encode(Sha256::digest(&content))),
            error: outcome.as_ref().err().map(|e| e.to_string()),
        }
    }

    /// A proof that could not even be set up (bad URL, unreadable key).
    pub fn setup_failed(url: &str, kind: SignatureKind, error: &ProofError) -> Self {
        Self {
            url: url.to_string(),
            kind,
            verified: false,
            last_checked: None,
            content_len: 0,
            content_sha256: None,
            error: Some(error.to_string()),
        }
    }
}
