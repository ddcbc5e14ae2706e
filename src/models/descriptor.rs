//! Represents one stored version of a file and the request that creates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation a stored version records.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "d")]
    Delete,
}

impl Operation {
    /// Single-character code used inside object keys.
    pub fn code(self) -> &'static str {
        match self {
            Operation::Write => "w",
            Operation::Delete => "d",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "w" => Some(Operation::Write),
            "d" => Some(Operation::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Metadata of a single stored object version.
///
/// `(bucket, name, version)` identifies a descriptor uniquely. The checksum
/// always describes the plaintext bytes and is computed by the engine, never
/// taken from caller-supplied metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Logical file identity within the bucket.
    pub name: String,

    /// Opaque version token, unique per name.
    pub version: String,

    /// `bucket/name/version` locator.
    pub path: String,

    /// URL-safe base64 SHA-256 of the plaintext, empty for tombstones.
    pub checksum: String,

    pub content_type: String,

    /// Domain schema tag. May be empty and may contain `.` characters.
    #[serde(default)]
    pub archetype: String,

    /// Plaintext size in bytes.
    pub size: i64,

    pub created_at: DateTime<Utc>,

    pub operation: Operation,

    /// Index tags. Carried forward on tombstones for traceability.
    #[serde(default)]
    pub labels: Vec<String>,
}

impl FileDescriptor {
    pub fn is_deleted(&self) -> bool {
        self.operation == Operation::Delete
    }
}

/// Builds the `bucket/name/version` locator stored in descriptors.
pub fn descriptor_path(bucket: &str, name: &str, version: &str) -> String {
    format!("{}/{}/{}", bucket, name, version)
}

/// A write request handed to the object store. Lives for one store call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewObjectInfo {
    pub name: String,
    pub version: String,
    pub operation: Operation,
    pub checksum: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub content_type: String,
    pub archetype: String,
    pub labels: Vec<String>,
}

impl NewObjectInfo {
    /// Descriptor for this request once it has been persisted with `size` bytes.
    pub fn to_descriptor(&self, bucket: &str, size: i64) -> FileDescriptor {
        FileDescriptor {
            name: self.name.clone(),
            version: self.version.clone(),
            path: descriptor_path(bucket, &self.name, &self.version),
            checksum: self.checksum.clone(),
            content_type: self.content_type.clone(),
            archetype: self.archetype.clone(),
            size,
            created_at: self.created_at,
            operation: self.operation,
            labels: self.labels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> FileDescriptor {
        FileDescriptor {
            name: "Image".into(),
            version: "V1".into(),
            path: "BUCKET/Image/V1".into(),
            checksum: "CHS".into(),
            content_type: "image/jpeg".into(),
            archetype: String::new(),
            size: 15698,
            created_at: Utc.with_ymd_and_hms(2018, 1, 18, 15, 22, 46).unwrap()
                + chrono::Duration::milliseconds(123),
            operation: Operation::Write,
            labels: vec!["basicPatientInfo".into()],
        }
    }

    #[test]
    fn serializes_with_collection_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["contentType"], "image/jpeg");
        assert_eq!(value["createdAt"], "2018-01-18T15:22:46.123Z");
        assert_eq!(value["operation"], "w");
        assert_eq!(value["labels"][0], "basicPatientInfo");
    }

    #[test]
    fn missing_labels_and_archetype_default_to_empty() {
        let json = r#"{
            "name":"Image","version":"V1","path":"BUCKET/Image/V1","checksum":"CHS",
            "contentType":"image/jpeg","size":15698,
            "createdAt":"2018-01-18T15:22:46.123Z","operation":"d"
        }"#;
        let fd: FileDescriptor = serde_json::from_str(json).unwrap();
        assert!(fd.labels.is_empty());
        assert!(fd.archetype.is_empty());
        assert!(fd.is_deleted());
    }

    #[test]
    fn operation_codes() {
        assert_eq!(Operation::from_code("w"), Some(Operation::Write));
        assert_eq!(Operation::from_code("d"), Some(Operation::Delete));
        assert_eq!(Operation::from_code("x"), None);
        assert_eq!(Operation::Delete.to_string(), "d");
    }
}
