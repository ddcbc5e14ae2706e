//! In-memory blob backend for tests and embedding.
//!
//! Payloads are still sealed, so a wrong or rotated key fails exactly as it
//! would against a real backend. Fault injection hooks let callers simulate
//! backend outages for individual keys or listings.

use super::{BlobBackend, EntryStream, ObjectEntry, ObjectMeta, ensure_bucket_name_safe, ensure_key_safe};
use crate::errors::{StorageError, StorageResult};
use crate::models::BucketDescriptor;
use crate::services::crypto::EncryptionKey;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

struct StoredBlob {
    sealed: Vec<u8>,
    size: i64,
    meta: ObjectMeta,
}

struct MemoryBucket {
    created_at: DateTime<Utc>,
    objects: BTreeMap<String, StoredBlob>,
    /// Keys listed without a payload, used to simulate corrupt listings.
    raw_entries: BTreeMap<String, ObjectEntry>,
}

#[derive(Default)]
struct Faults {
    failing_put_prefixes: Vec<String>,
    broken_listings: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryBackend {
    buckets: RwLock<BTreeMap<String, MemoryBucket>>,
    faults: RwLock<Faults>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put whose key starts with `prefix` fail.
    pub async fn fail_puts_with_prefix(&self, prefix: impl Into<String>) {
        self.faults
            .write()
            .await
            .failing_put_prefixes
            .push(prefix.into());
    }

    /// Append a failing entry to every listing of `bucket`.
    pub async fn fail_listing(&self, bucket: impl Into<String>) {
        self.faults.write().await.broken_listings.insert(bucket.into());
    }

    pub async fn clear_faults(&self) {
        *self.faults.write().await = Faults::default();
    }

    /// List `key` in `bucket` without storing a payload for it.
    pub async fn insert_raw(&self, bucket: &str, entry: ObjectEntry) -> StorageResult<()> {
        let mut buckets = self.buckets.write().await;
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        state.raw_entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Number of stored payloads in `bucket`.
    pub async fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.objects.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
        ensure_bucket_name_safe(bucket)?;
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        buckets.insert(
            bucket.to_string(),
            MemoryBucket {
                created_at: Utc::now(),
                objects: BTreeMap::new(),
                raw_entries: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketDescriptor>> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .map(|(name, state)| BucketDescriptor {
                name: name.clone(),
                created_at: state.created_at,
            })
            .collect())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<EntryStream> {
        let buckets = self.buckets.read().await;
        let state = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;

        let mut entries: BTreeMap<String, ObjectEntry> = state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, blob)| {
                (
                    key.clone(),
                    ObjectEntry {
                        key: key.clone(),
                        size: blob.size,
                        content_type: blob.meta.content_type.clone(),
                        labels: blob.meta.labels.clone(),
                    },
                )
            })
            .collect();
        for (key, entry) in state.raw_entries.iter() {
            if key.starts_with(prefix) {
                entries.insert(key.clone(), entry.clone());
            }
        }

        let mut items: Vec<StorageResult<ObjectEntry>> = entries.into_values().map(Ok).collect();
        if self.faults.read().await.broken_listings.contains(bucket) {
            items.push(Err(StorageError::Backend(format!(
                "listing of bucket `{}` failed",
                bucket
            ))));
        }
        Ok(stream::iter(items).boxed())
    }

    async fn put_encrypted(
        &self,
        bucket: &str,
        object_key: &str,
        data: Bytes,
        meta: ObjectMeta,
        key: &EncryptionKey,
    ) -> StorageResult<i64> {
        ensure_key_safe(object_key)?;
        if self
            .faults
            .read()
            .await
            .failing_put_prefixes
            .iter()
            .any(|p| object_key.starts_with(p.as_str()))
        {
            return Err(StorageError::Backend(format!(
                "put of `{}` rejected by backend",
                object_key
            )));
        }

        let sealed = key.seal(&data)?;
        let size = data.len() as i64;
        let mut buckets = self.buckets.write().await;
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        state
            .objects
            .insert(object_key.to_string(), StoredBlob { sealed, size, meta });
        Ok(size)
    }

    async fn get_encrypted(
        &self,
        bucket: &str,
        object_key: &str,
        key: &EncryptionKey,
    ) -> StorageResult<Bytes> {
        let buckets = self.buckets.read().await;
        let state = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        let blob = state
            .objects
            .get(object_key)
            .ok_or_else(|| StorageError::not_found(bucket, object_key))?;
        Ok(Bytes::from(key.open(&blob.sealed)?))
    }
}
