//! Ed25519 signing oracle for eID-style attestations.
//!
//! Grounded on `freeq-server::policy::credentials::sign_credential` (sign a
//! canonical byte string, base64url-encode the signature) and
//! `freeq-server::verifiers::mod::did_document` (multicodec/multibase
//! encoding of the public key for publication).

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::CryptoError;

/// Multicodec prefix for an Ed25519 public key (0xed01, varint-encoded).
const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

pub struct AttestationSigner {
    key: SigningKey,
}

impl AttestationSigner {
    /// Build a signer from a 32-byte seed, base64-encoded.
    pub fn from_seed_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidSeedLength(bytes.len()));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    /// Canonical message is `hash|issuer_did|ts`. Returns a base64url
    /// (no padding) signature.
    pub fn sign_attestation(&self, hash: &str, issuer_did: &str, ts: &str) -> String {
        let message = format!("{hash}|{issuer_did}|{ts}");
        let signature: Signature = self.key.sign(message.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(signature.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Multicodec/multibase encoding (`z` + base58btc) of the public key,
    /// for publication in the service's well-known DID document.
    pub fn public_key_multibase(&self) -> String {
        encode_multibase(&self.key.verifying_key())
    }
}

pub fn encode_multibase(key: &VerifyingKey) -> String {
    let mut prefixed = Vec::with_capacity(2 + 32);
    prefixed.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
    prefixed.extend_from_slice(key.as_bytes());
    format!("z{}", bs58::encode(prefixed).into_string())
}

/// Verify an attestation signature against the canonical message and a
/// public key. Used by tests and by any downstream verifier of published
/// attestations.
pub fn verify_attestation(
    hash: &str,
    issuer_did: &str,
    ts: &str,
    signature_b64: &str,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let sig_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| CryptoError::InvalidSignatureEncoding(e.to_string()))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| CryptoError::InvalidSignatureEncoding(e.to_string()))?;
    let message = format!("{hash}|{issuer_did}|{ts}");
    Ok(public_key.verify(message.as_bytes(), &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> AttestationSigner {
        let seed = base64::engine::general_purpose::STANDARD.encode([9u8; 32]);
        AttestationSigner::from_seed_base64(&seed).unwrap()
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let s = signer();
        let sig = s.sign_attestation("deadbeef", "did:plc:issuer", "2026-01-01T00:00:00Z");
        let pk = s.verifying_key();
        assert!(verify_attestation("deadbeef", "did:plc:issuer", "2026-01-01T00:00:00Z", &sig, &pk).unwrap());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let s = signer();
        let sig = s.sign_attestation("deadbeef", "did:plc:issuer", "2026-01-01T00:00:00Z");
        let pk = s.verifying_key();
        assert!(!verify_attestation("deadbeee", "did:plc:issuer", "2026-01-01T00:00:00Z", &sig, &pk).unwrap());
    }

    #[test]
    fn multibase_has_z_prefix() {
        let s = signer();
        assert!(s.public_key_multibase().starts_with('z'));
    }
}
