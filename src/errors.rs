//! Error taxonomy shared by the store, the versioning service and the sync path.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file `{name}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, name: String },
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    /// Two different payloads were written under the same `(name, version)`.
    #[error("file `{name}` version `{version}` in bucket `{bucket}` already exists with different content")]
    AlreadyExistsConflict {
        bucket: String,
        name: String,
        version: String,
    },
    #[error("malformed object key `{key}`: {reason}")]
    MalformedKey { key: String, reason: String },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("key provider: {0}")]
    KeyProvider(String),
    #[error("crypto: {0}")]
    Crypto(String),
    #[error("backend: {0}")]
    Backend(String),
    #[error("publish: {0}")]
    Publish(String),
    #[error("publisher is closed")]
    PublisherClosed,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn not_found(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    pub fn malformed_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for absence of an object or bucket, which several callers treat as empty state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::BucketNotFound(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
