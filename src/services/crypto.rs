//! Bucket-scoped payload encryption using ChaCha20-Poly1305.
//!
//! Sealed format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! A fresh random nonce is drawn for every seal.

use crate::errors::{StorageError, StorageResult};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use std::fmt;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

/// 256-bit symmetric key for one bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    pub fn generate() -> StorageResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        getrandom::getrandom(&mut bytes)
            .map_err(|err| StorageError::Crypto(format!("failed to generate key: {}", err)))?;
        Ok(Self(bytes))
    }

    pub fn from_slice(data: &[u8]) -> StorageResult<Self> {
        let bytes: [u8; KEY_SIZE] = data.try_into().map_err(|_| {
            StorageError::Crypto(format!(
                "invalid key size, expected {}, got {}",
                KEY_SIZE,
                data.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn from_hex(encoded: &str) -> StorageResult<Self> {
        let raw = hex::decode(encoded.trim())
            .map_err(|err| StorageError::Crypto(format!("invalid hex key: {}", err)))?;
        Self::from_slice(&raw)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn seal(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|err| StorageError::Crypto(format!("failed to generate nonce: {}", err)))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|err| StorageError::Crypto(format!("encryption failed: {}", err)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> StorageResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE {
            return Err(StorageError::Crypto(format!(
                "sealed payload too short: {} bytes",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Crypto("decryption failed: wrong key or corrupt payload".into()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let key = EncryptionKey::generate().unwrap();
        let sealed = key.seal(b"contents").unwrap();
        assert_ne!(&sealed[NONCE_SIZE..], b"contents");
        assert_eq!(key.open(&sealed).unwrap(), b"contents");
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = EncryptionKey::generate().unwrap();
        assert_ne!(key.seal(b"same").unwrap(), key.seal(b"same").unwrap());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let sealed = EncryptionKey::generate().unwrap().seal(b"secret").unwrap();
        let other = EncryptionKey::generate().unwrap();
        assert!(matches!(other.open(&sealed), Err(StorageError::Crypto(_))));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let key = EncryptionKey::generate().unwrap();
        assert!(key.open(&[1, 2, 3]).is_err());
    }

    #[test]
    fn hex_keys() {
        let hex_key = "00".repeat(KEY_SIZE);
        assert_eq!(EncryptionKey::from_hex(&hex_key).unwrap().as_bytes(), &[0u8; KEY_SIZE]);
        assert!(EncryptionKey::from_hex("abcd").is_err());
        assert!(EncryptionKey::from_hex("zz").is_err());
    }

    #[test]
    fn debug_hides_key_material() {
        let key = EncryptionKey::from_slice(&[9u8; KEY_SIZE]).unwrap();
        assert_eq!(format!("{:?}", key), "EncryptionKey(..)");
    }
}
