//! EncryptedObjectStore: descriptor-level read/write/list over a blob backend.
//!
//! Descriptor metadata is encoded into the storage key, labels ride along as
//! backend metadata and payloads are sealed with the bucket key fetched from
//! the key provider on every call.

use crate::errors::{StorageError, StorageResult};
use crate::models::{BucketDescriptor, FileDescriptor, NewObjectInfo};
use crate::services::backend::{BlobBackend, ObjectMeta};
use crate::services::key_provider::KeyProvider;
use crate::services::object_key::{self, ObjectKey};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Plaintext of a stored object.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

pub async fn read_to_bytes(mut reader: ObjectReader) -> StorageResult<Bytes> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Storage capability consumed by the versioning service and the sync reconciler.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create `bucket`; `BucketAlreadyExists` when present. Callers decide whether that matters.
    async fn make_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    async fn list_buckets(&self) -> StorageResult<Vec<BucketDescriptor>>;

    /// Every stored version under `prefix`. Fails as a whole if any entry fails.
    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<FileDescriptor>>;

    /// Newest version of `name`, or exactly `version` when given.
    async fn read(
        &self,
        bucket: &str,
        name: &str,
        version: Option<&str>,
    ) -> StorageResult<(ObjectReader, FileDescriptor)>;

    async fn write(
        &self,
        bucket: &str,
        info: &NewObjectInfo,
        data: Bytes,
    ) -> StorageResult<FileDescriptor>;
}

pub struct EncryptedObjectStore {
    backend: Arc<dyn BlobBackend>,
    keys: Arc<dyn KeyProvider>,
}

impl EncryptedObjectStore {
    pub fn new(backend: Arc<dyn BlobBackend>, keys: Arc<dyn KeyProvider>) -> Self {
        Self { backend, keys }
    }
}

#[async_trait]
impl ObjectStorage for EncryptedObjectStore {
    async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
        if self.backend.bucket_exists(bucket).await? {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        self.backend.make_bucket(bucket).await
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        self.backend.bucket_exists(bucket).await
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketDescriptor>> {
        self.backend.list_buckets().await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<FileDescriptor>> {
        let mut entries = self.backend.list_objects(bucket, prefix).await?;
        let mut descriptors = Vec::new();
        while let Some(entry) = entries.try_next().await? {
            let decoded = ObjectKey::parse(&entry.key)?;
            descriptors.push(decoded.into_descriptor(
                bucket,
                entry.size,
                entry.content_type,
                entry.labels,
            ));
        }
        Ok(descriptors)
    }

    async fn read(
        &self,
        bucket: &str,
        name: &str,
        version: Option<&str>,
    ) -> StorageResult<(ObjectReader, FileDescriptor)> {
        let prefix = match version {
            Some(v) if !v.is_empty() => ObjectKey::version_prefix(name, v),
            _ => ObjectKey::name_prefix(name),
        };

        let listed = self.list(bucket, &prefix).await?;
        let latest = listed
            .into_iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .ok_or_else(|| StorageError::not_found(bucket, name))?;

        let key = self.keys.get(bucket).await?;
        let storage_key = ObjectKey::from(&latest).to_string();
        let data = self.backend.get_encrypted(bucket, &storage_key, &key).await?;
        debug!(bucket = %bucket, key = %storage_key, "read object");

        Ok((Box::new(Cursor::new(data)), latest))
    }

    async fn write(
        &self,
        bucket: &str,
        info: &NewObjectInfo,
        data: Bytes,
    ) -> StorageResult<FileDescriptor> {
        let key = self.keys.get(bucket).await?;
        let storage_key = object_key::encode(info);
        let meta = ObjectMeta {
            content_type: info.content_type.clone(),
            labels: info.labels.clone(),
        };

        let size = self
            .backend
            .put_encrypted(bucket, &storage_key, data, meta, &key)
            .await?;
        debug!(bucket = %bucket, key = %storage_key, size, "wrote object");

        Ok(info.to_descriptor(bucket, size))
    }
}
