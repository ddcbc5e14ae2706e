//! Sources of per-bucket encryption keys.
//!
//! The object store resolves the key on every read and write and caches
//! nothing itself, so rotation in the provider takes effect immediately.

use crate::errors::StorageResult;
use crate::services::crypto::EncryptionKey;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Key for `bucket`. May involve a network round trip and may fail transiently.
    async fn get(&self, bucket: &str) -> StorageResult<EncryptionKey>;
}

/// Provisions a random key per bucket on first use and keeps it in memory.
///
/// Keys do not survive a restart, so this provider suits tests and
/// ephemeral deployments only.
#[derive(Default)]
pub struct MemoryKeyProvider {
    keys: RwLock<HashMap<String, EncryptionKey>>,
}

impl MemoryKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the key of `bucket`. Data sealed with the old key stops being readable.
    pub async fn rotate(&self, bucket: &str) -> StorageResult<EncryptionKey> {
        let key = EncryptionKey::generate()?;
        self.keys
            .write()
            .await
            .insert(bucket.to_string(), key.clone());
        Ok(key)
    }
}

#[async_trait]
impl KeyProvider for MemoryKeyProvider {
    async fn get(&self, bucket: &str) -> StorageResult<EncryptionKey> {
        if let Some(key) = self.keys.read().await.get(bucket) {
            return Ok(key.clone());
        }
        let mut keys = self.keys.write().await;
        if let Some(key) = keys.get(bucket) {
            return Ok(key.clone());
        }
        let key = EncryptionKey::generate()?;
        keys.insert(bucket.to_string(), key.clone());
        Ok(key)
    }
}

/// Derives bucket keys from one master secret: `SHA-256(master || 0x00 || bucket)`.
pub struct DerivedKeyProvider {
    master: EncryptionKey,
}

impl DerivedKeyProvider {
    pub fn new(master: EncryptionKey) -> Self {
        Self { master }
    }
}

#[async_trait]
impl KeyProvider for DerivedKeyProvider {
    async fn get(&self, bucket: &str) -> StorageResult<EncryptionKey> {
        let mut hasher = Sha256::new();
        hasher.update(self.master.as_bytes());
        hasher.update([0u8]);
        hasher.update(bucket.as_bytes());
        EncryptionKey::from_slice(&hasher.finalize())
    }
}
