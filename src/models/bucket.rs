//! Represents a bucket, the top-level container for the files of one owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A storage bucket.
///
/// Bucket names are opaque identifiers chosen by the caller (typically the
/// id of the record owner). Encryption keys are scoped to a bucket.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketDescriptor {
    /// Bucket identifier.
    pub name: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
