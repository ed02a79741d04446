use chrono::{DateTime, Utc};
use pgp::cleartext::CleartextSignedMessage;
use pgp::packet::{Signature, SignatureType};
use pgp::types::PublicKeyTrait;
use pgp::{Deserializable, SignedPublicKey, SignedPublicSubKey};

use super::{SignatureKind, Verifier};
use crate::error::{ProofError, Result};

/// Verifies OpenPGP armored cleartext signatures (RFC 4880 §7).
///
/// The key must be valid at the reference time: created no later than it,
/// not expired or revoked by it, with intact self-signatures. A signature is
/// accepted if it verifies against the primary key, or against a subkey that
/// is bound for signing and itself unexpired and unrevoked at that time.
pub struct PgpVerifier;

impl Verifier for PgpVerifier {
    fn kind(&self) -> SignatureKind {
        SignatureKind::Pgp
    }

    fn verify(&self, message: &[u8], public_key: &[u8], at: DateTime<Utc>) -> Result<()> {
        let key_armor = std::str::from_utf8(public_key)
            .map_err(|_| ProofError::KeyNotValid("public key is not UTF-8 armor".into()))?;
        let message_armor = std::str::from_utf8(message)
            .map_err(|_| ProofError::InvalidSignature("message is not UTF-8 armor".into()))?;

        let (key, _headers) = SignedPublicKey::from_string(key_armor)?;
        key.verify()?;
        check_key_validity(&key, at)?;

        let (signed, _headers) = CleartextSignedMessage::from_string(message_armor)?;
        if signed.signatures().is_empty() {
            return Err(ProofError::InvalidSignature(
                "message carries no signatures".into(),
            ));
        }

        for standalone in signed.signatures() {
            if let Some(created) = standalone.signature.created() {
                if *created > at {
                    return Err(ProofError::InvalidSignature(format!(
                        "signature created at {created}, after reference time {at}"
                    )));
                }
            }
        }

        let primary = signed.verify(&key);
        if primary.is_ok() {
            return Ok(());
        }
        if let Some(subkey) = key
            .public_subkeys
            .iter()
            .find(|subkey| signed.verify(*subkey).is_ok())
        {
            return check_subkey_validity(subkey, at);
        }

        let reason = primary
            .err()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no matching key".into());
        Err(ProofError::InvalidSignature(reason))
    }
}

fn check_key_validity(key: &SignedPublicKey, at: DateTime<Utc>) -> Result<()> {
    let created = *key.created_at();
    if created > at {
        return Err(ProofError::KeyNotValid(format!(
            "key created at {created}, after reference time {at}"
        )));
    }
    if let Some(expires) = key.expires_at() {
        if expires <= at {
            return Err(ProofError::KeyNotValid(format!("key expired at {expires}")));
        }
    }
    if let Some(revoked) = revoked_by(&key.details.revocation_signatures, at) {
        return Err(ProofError::KeyNotValid(format!("key revoked at {revoked}")));
    }
    Ok(())
}

fn check_subkey_validity(subkey: &SignedPublicSubKey, at: DateTime<Utc>) -> Result<()> {
    let id = hex::encode(subkey.key_id());
    let created = *subkey.created_at();
    if created > at {
        return Err(ProofError::KeyNotValid(format!(
            "subkey {id} created at {created}, after reference time {at}"
        )));
    }

    let revocations = subkey
        .signatures
        .iter()
        .filter(|sig| sig.typ() == SignatureType::SubkeyRevocation);
    if let Some(revoked) = revoked_by(revocations, at) {
        return Err(ProofError::KeyNotValid(format!(
            "subkey {id} revoked at {revoked}"
        )));
    }

    // The newest binding in effect at `at` carries the flags and lifetime.
    let binding = subkey
        .signatures
        .iter()
        .filter(|sig| sig.typ() == SignatureType::SubkeyBinding)
        .filter(|sig| sig.created().map_or(true, |c| *c <= at))
        .max_by_key(|sig| sig.created().copied())
        .ok_or_else(|| {
            ProofError::KeyNotValid(format!("subkey {id} has no binding at {at}"))
        })?;

    if !binding.key_flags().sign() {
        return Err(ProofError::KeyNotValid(format!(
            "subkey {id} is not bound for signing"
        )));
    }
    if let Some(lifetime) = binding.key_expiration_time() {
        let expires = created + *lifetime;
        if expires <= at {
            return Err(ProofError::KeyNotValid(format!(
                "subkey {id} expired at {expires}"
            )));
        }
    }
    Ok(())
}

/// Creation time of the first revocation that is in effect at `at`.
/// A revocation without a creation time is always in effect.
fn revoked_by<'a>(
    revocations: impl IntoIterator<Item = &'a Signature>,
    at: DateTime<Utc>,
) -> Option<String> {
    revocations.into_iter().find_map(|sig| match sig.created() {
        Some(created) if *created <= at => Some(created.to_string()),
        Some(_) => None,
        None => Some("an unknown time".to_string()),
    })
}
