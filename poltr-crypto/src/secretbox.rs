//! Symmetric authenticated encryption for PDS app-passwords.
//!
//! Grounded on `freeq-server::db`'s at-rest encryption
//! (`encrypt_at_rest`/`decrypt_at_rest`: AEAD, random nonce prepended to the
//! ciphertext, base64 transport encoding), using an XChaCha20-Poly1305
//! construction with a 24-byte nonce.

use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;

use crate::CryptoError;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;

/// A 32-byte symmetric key loaded once at startup from base64 configuration.
///
/// `Debug`/`Display` are intentionally not derived; the key must never be
/// logged.
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(REDACTED)")
    }
}

/// Encrypts and decrypts app-passwords with a fixed master key.
pub struct SecretBox {
    cipher: XChaCha20Poly1305,
}

impl SecretBox {
    pub fn new(key: MasterKey) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new((&key.0).into()),
        }
    }

    /// Encrypt `plaintext`, returning `(ciphertext, nonce)`. A fresh random
    /// nonce is drawn for every call, so two encryptions of the same
    /// plaintext never produce the same ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        Ok((ciphertext, nonce_bytes.to_vec()))
    }

    /// Decrypt `ciphertext` under `nonce`. A tag mismatch is a hard error,
    /// never treated as empty plaintext.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::CiphertextTooShort);
        }
        let nonce = XNonce::from_slice(nonce);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    pub fn encrypt_str(&self, plaintext: &str) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_to_string(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<String, CryptoError> {
        let bytes = self.decrypt(ciphertext, nonce)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_box() -> SecretBox {
        let key = MasterKey::from_base64(&base64::engine::general_purpose::STANDARD.encode([7u8; 32]))
            .unwrap();
        SecretBox::new(key)
    }

    #[test]
    fn round_trips() {
        let sb = test_box();
        let (ct, nonce) = sb.encrypt_str("hunter2-app-password").unwrap();
        let pt = sb.decrypt_to_string(&ct, &nonce).unwrap();
        assert_eq!(pt, "hunter2-app-password");
    }

    #[test]
    fn nonces_are_fresh() {
        let sb = test_box();
        let (ct1, nonce1) = sb.encrypt_str("same-plaintext").unwrap();
        let (ct2, nonce2) = sb.encrypt_str("same-plaintext").unwrap();
        assert_ne!(ct1, ct2);
        assert_ne!(nonce1, nonce2);
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let sb = test_box();
        let (mut ct, nonce) = sb.encrypt_str("sensitive").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        assert!(matches!(
            sb.decrypt(&ct, &nonce),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn rejects_non_32_byte_key() {
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        assert!(matches!(
            MasterKey::from_base64(&short),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_plaintexts_round_trip(s in ".{0,256}") {
            let sb = test_box();
            let (ct, nonce) = sb.encrypt_str(&s).unwrap();
            let pt = sb.decrypt_to_string(&ct, &nonce).unwrap();
            proptest::prop_assert_eq!(pt, s);
        }
    }
}
