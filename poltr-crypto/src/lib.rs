//! Secret Box: authenticated encryption for app-passwords at rest, and the
//! Ed25519 attestation-signing oracle used to publish this service's
//! verification key in its DID document.

mod attestation;
mod secretbox;

pub use attestation::AttestationSigner;
pub use secretbox::{MasterKey, SecretBox};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("master key must be exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("master key is not valid base64: {0}")]
    InvalidKeyEncoding(#[from] base64::DecodeError),
    #[error("decryption failed: authentication tag mismatch")]
    DecryptionFailed,
    #[error("ciphertext too short to contain a nonce")]
    CiphertextTooShort,
    #[error("signing key seed must be exactly 32 bytes, got {0}")]
    InvalidSeedLength(usize),
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),
}
