//! Change events emitted after every persisted mutation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Event kind, carried out-of-band next to the payload (e.g. as the subject).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "file.new")]
    FileNew,
    #[serde(rename = "file.update")]
    FileUpdate,
    #[serde(rename = "file.delete")]
    FileDelete,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::FileNew => "file.new",
            EventKind::FileUpdate => "file.update",
            EventKind::FileDelete => "file.delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload consumed by replication peers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    #[serde(rename = "bucketID")]
    pub bucket_id: String,
    #[serde(rename = "fileID")]
    pub file_id: String,
    pub version: String,
    #[serde(
        serialize_with = "serialize_millis",
        deserialize_with = "deserialize_rfc3339"
    )]
    pub timestamp: DateTime<Utc>,
}

impl FileInfo {
    pub fn new(
        bucket_id: impl Into<String>,
        file_id: impl Into<String>,
        version: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            file_id: file_id.into(),
            version: version.into(),
            timestamp,
        }
    }
}

fn serialize_millis<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn deserialize_rfc3339<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}
