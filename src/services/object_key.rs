//! Encoding of descriptor metadata into a single storage key.
//!
//! Layout: `name.version.operation.createdAtUnixMillis.checksum.archetype`.
//! The archetype is everything after the fifth delimiter and is never split,
//! so it may itself contain `.` characters or be empty.

use crate::errors::{StorageError, StorageResult};
use crate::models::descriptor::{FileDescriptor, NewObjectInfo, Operation, descriptor_path};
use chrono::{DateTime, Utc};
use std::fmt;

pub const DELIMITER: char = '.';

/// Fields recoverable from a storage key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKey {
    pub name: String,
    pub version: String,
    pub operation: Operation,
    pub created_at: DateTime<Utc>,
    pub checksum: String,
    pub archetype: String,
}

impl ObjectKey {
    /// Decode a raw storage key.
    pub fn parse(key: &str) -> StorageResult<Self> {
        let parts: Vec<&str> = key.splitn(6, DELIMITER).collect();
        if parts.len() < 5 {
            return Err(StorageError::malformed_key(
                key,
                format!("expected at least 5 fields, found {}", parts.len()),
            ));
        }

        let operation = Operation::from_code(parts[2]).ok_or_else(|| {
            StorageError::malformed_key(key, format!("unknown operation `{}`", parts[2]))
        })?;
        let millis = parts[3].parse::<i64>().map_err(|err| {
            StorageError::malformed_key(key, format!("invalid timestamp `{}`: {}", parts[3], err))
        })?;
        let created_at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            StorageError::malformed_key(key, format!("timestamp {} out of range", millis))
        })?;

        Ok(Self {
            name: parts[0].to_string(),
            version: parts[1].to_string(),
            operation,
            created_at,
            checksum: parts[4].to_string(),
            archetype: parts.get(5).map(|s| s.to_string()).unwrap_or_default(),
        })
    }

    /// Prefix matching every version of `name`.
    pub fn name_prefix(name: &str) -> String {
        format!("{}{}", name, DELIMITER)
    }

    /// Prefix matching exactly one `(name, version)`.
    pub fn version_prefix(name: &str, version: &str) -> String {
        format!("{}{}{}{}", name, DELIMITER, version, DELIMITER)
    }

    /// Combine decoded key fields with backend metadata into a descriptor.
    pub fn into_descriptor(
        self,
        bucket: &str,
        size: i64,
        content_type: String,
        labels: Vec<String>,
    ) -> FileDescriptor {
        FileDescriptor {
            path: descriptor_path(bucket, &self.name, &self.version),
            name: self.name,
            version: self.version,
            checksum: self.checksum,
            content_type,
            archetype: self.archetype,
            size,
            created_at: self.created_at,
            operation: self.operation,
            labels,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{name}{d}{version}{d}{op}{d}{ts}{d}{checksum}{d}{archetype}",
            d = DELIMITER,
            name = self.name,
            version = self.version,
            op = self.operation.code(),
            ts = self.created_at.timestamp_millis(),
            checksum = self.checksum,
            archetype = self.archetype,
        )
    }
}

impl From<&NewObjectInfo> for ObjectKey {
    fn from(info: &NewObjectInfo) -> Self {
        Self {
            name: info.name.clone(),
            version: info.version.clone(),
            operation: info.operation,
            created_at: info.created_at,
            checksum: info.checksum.clone(),
            archetype: info.archetype.clone(),
        }
    }
}

impl From<&FileDescriptor> for ObjectKey {
    fn from(fd: &FileDescriptor) -> Self {
        Self {
            name: fd.name.clone(),
            version: fd.version.clone(),
            operation: fd.operation,
            created_at: fd.created_at,
            checksum: fd.checksum.clone(),
            archetype: fd.archetype.clone(),
        }
    }
}

/// Encode a write request into its storage key.
pub fn encode(info: &NewObjectInfo) -> String {
    ObjectKey::from(info).to_string()
}
