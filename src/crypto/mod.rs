//! Secret codec
//!
//! Symmetric encryption for card numbers and CVVs, plus masked-number
//! derivation. Sensitive fields are only ever persisted as ciphertext; the
//! decrypted PAN never leaves this module except through `mask_pan`.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use std::fmt;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// A 32-byte symmetric key for the card codec.
///
/// Parsed from hex configuration; never logged or serialized in clear.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a random key (tests and key provisioning tooling)
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(bytes)
    }

    /// Parse a key from a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidKey)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Symmetric encrypt/decrypt for card-sensitive fields.
///
/// AES-256-GCM with a random 12-byte nonce per encryption; stored form is
/// `hex(nonce || ciphertext)`. The same plaintext therefore encrypts to a
/// different ciphertext each time, so equality checks on stored values must
/// go through a deterministic fingerprint, not the ciphertext.
#[derive(Clone)]
pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl SecretCodec {
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Encrypt a plaintext value for storage
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    /// Decrypt a stored value.
    ///
    /// Fails on malformed input or a key mismatch. Callers must treat failure
    /// as fatal for the operation; there is no fallback to the stored bytes.
    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let bytes = hex::decode(stored).map_err(|_| CryptoError::Malformed)?;
        if bytes.len() <= NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretCodec")
    }
}

/// Derive the display-safe masked form of a PAN.
///
/// Only the last 4 characters survive; everything else is the fixed template.
pub fn mask_pan(pan: &str) -> String {
    let digits: Vec<char> = pan.chars().collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("**** **** **** {}", tail)
}

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid encryption key (expected 32 bytes hex)")]
    InvalidKey,

    #[error("Malformed ciphertext")]
    Malformed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SecretCodec {
        SecretCodec::new(&EncryptionKey::generate())
    }

    #[test]
    fn test_round_trip_pan_like() {
        let codec = codec();
        for pan in [
            "4000123412341234",
            "5105105105105100",
            "4000000000000002",
        ] {
            let stored = codec.encrypt(pan).unwrap();
            assert_ne!(stored, pan);
            assert_eq!(codec.decrypt(&stored).unwrap(), pan);
        }
    }

    #[test]
    fn test_round_trip_cvv_like() {
        let codec = codec();
        for cvv in ["000", "123", "999"] {
            let stored = codec.encrypt(cvv).unwrap();
            assert_eq!(codec.decrypt(&stored).unwrap(), cvv);
        }
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let codec = codec();
        let a = codec.encrypt("4000123412341234").unwrap();
        let b = codec.encrypt("4000123412341234").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_rejects_malformed() {
        let codec = codec();
        assert_eq!(codec.decrypt("not-hex"), Err(CryptoError::Malformed));
        assert_eq!(codec.decrypt("abcd"), Err(CryptoError::Malformed));
    }

    #[test]
    fn test_decrypt_rejects_tampering() {
        let codec = codec();
        let stored = codec.encrypt("4000123412341234").unwrap();
        let mut bytes = hex::decode(&stored).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let tampered = hex::encode(bytes);
        assert_eq!(codec.decrypt(&tampered), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_decrypt_rejects_wrong_key() {
        let a = codec();
        let b = codec();
        let stored = a.encrypt("123").unwrap();
        assert_eq!(b.decrypt(&stored), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_key_from_hex() {
        let key = EncryptionKey::generate();
        let round = EncryptionKey::from_hex(&hex::encode(key.as_bytes())).unwrap();
        assert_eq!(key, round);

        assert!(EncryptionKey::from_hex("abcd").is_err());
        assert!(EncryptionKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::generate();
        assert_eq!(format!("{:?}", key), "EncryptionKey([REDACTED])");
    }

    #[test]
    fn test_mask_pan() {
        assert_eq!(mask_pan("4000123412341234"), "**** **** **** 1234");
        assert_eq!(mask_pan("5105105105105100"), "**** **** **** 5100");
    }

    #[test]
    fn test_mask_never_exposes_leading_digits() {
        let masked = mask_pan("4000123412349876");
        assert!(!masked.contains("4000"));
        assert!(!masked.contains("1234"));
        assert!(masked.ends_with("9876"));
    }
}
