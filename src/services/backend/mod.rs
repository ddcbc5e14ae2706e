//! Blob backends: where sealed object bytes and their listing metadata live.
//!
//! A backend knows nothing about descriptors or versioning. It stores opaque
//! keys, encrypts payloads with the key it is handed and lists keys by prefix.

pub mod disk;
pub mod memory;

use crate::errors::{StorageError, StorageResult};
use crate::models::BucketDescriptor;
use crate::services::crypto::EncryptionKey;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

const BUCKET_NAME_MAX_LEN: usize = 63;
const MAX_OBJECT_KEY_LEN: usize = 1024;

/// One entry of a prefix listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    /// Plaintext size in bytes.
    pub size: i64,
    pub content_type: String,
    pub labels: Vec<String>,
}

/// Metadata stored next to a payload. Labels live here because the key does not carry them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_type: String,
    pub labels: Vec<String>,
}

/// Listing stream. Individual entries may fail without ending the stream.
pub type EntryStream = BoxStream<'static, StorageResult<ObjectEntry>>;

#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Create `bucket`. Fails with `BucketAlreadyExists` when it is already present.
    async fn make_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    async fn list_buckets(&self) -> StorageResult<Vec<BucketDescriptor>>;

    /// Entries of `bucket` whose key starts with `prefix`, in key order.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<EntryStream>;

    /// Seal `data` with `key` and store it; returns the plaintext size written.
    async fn put_encrypted(
        &self,
        bucket: &str,
        object_key: &str,
        data: Bytes,
        meta: ObjectMeta,
        key: &EncryptionKey,
    ) -> StorageResult<i64>;

    /// Fetch and open the payload stored under `object_key`.
    async fn get_encrypted(
        &self,
        bucket: &str,
        object_key: &str,
        key: &EncryptionKey,
    ) -> StorageResult<Bytes>;
}

/// Bucket names are single path components without the key delimiter.
pub fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.len() > BUCKET_NAME_MAX_LEN {
        return Err(StorageError::BadRequest(format!(
            "bucket `{}` must be between 1 and {} characters",
            name, BUCKET_NAME_MAX_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(StorageError::BadRequest(format!(
            "bucket `{}` may only contain letters, digits, hyphens and underscores",
            name
        )));
    }
    Ok(())
}

/// Object keys must not carry path separators or control characters.
pub fn ensure_key_safe(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN || key == "." || key == ".." {
        return Err(StorageError::BadRequest(format!("invalid object key `{}`", key)));
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
    {
        return Err(StorageError::BadRequest(format!("invalid object key `{}`", key)));
    }
    Ok(())
}
