//! Applies writes that originated on a peer node.
//!
//! Unlike [`FileService`](crate::services::file_service::FileService) the
//! version and timestamp are supplied by the caller, so replaying a write is
//! detectable. Sync writes neither publish events nor touch collections.

use crate::errors::{StorageError, StorageResult};
use crate::models::{FileDescriptor, NewObjectInfo, Operation};
use crate::services::checksum::checksum;
use crate::services::clock::truncate_to_millis;
use crate::services::file_service::{ensure_bucket, normalize_labels, validate_identifier};
use crate::services::object_store::ObjectStorage;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// A write received from a peer, with its origin-assigned identity.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    pub name: String,
    pub version: String,
    pub content: Bytes,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub archetype: String,
    pub labels: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The write was persisted.
    Applied(FileDescriptor),
    /// An identical write was already present; nothing changed.
    AlreadyExists(FileDescriptor),
}

impl SyncOutcome {
    pub fn descriptor(&self) -> &FileDescriptor {
        match self {
            SyncOutcome::Applied(fd) | SyncOutcome::AlreadyExists(fd) => fd,
        }
    }

    pub fn into_descriptor(self) -> FileDescriptor {
        match self {
            SyncOutcome::Applied(fd) | SyncOutcome::AlreadyExists(fd) => fd,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, SyncOutcome::Applied(_))
    }
}

pub struct SyncReconciler {
    storage: Arc<dyn ObjectStorage>,
}

impl SyncReconciler {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Persist `file` at its own version unless that version is already stored.
    ///
    /// Same version and same checksum is a replay (`AlreadyExists`); same
    /// version with different content is `AlreadyExistsConflict`.
    pub async fn sync_file(&self, bucket: &str, file: IncomingFile) -> StorageResult<SyncOutcome> {
        validate_identifier("file id", &file.name)?;
        validate_identifier("version", &file.version)?;
        let labels = normalize_labels(file.labels)?;
        ensure_bucket(self.storage.as_ref(), bucket).await?;

        let sum = checksum(&file.content);
        match self.storage.read(bucket, &file.name, Some(&file.version)).await {
            Ok((_, existing)) if existing.checksum == sum => {
                debug!(bucket = %bucket, file = %file.name, version = %file.version, "sync replay ignored");
                return Ok(SyncOutcome::AlreadyExists(existing));
            }
            Ok(_) => {
                warn!(bucket = %bucket, file = %file.name, version = %file.version, "sync conflict");
                return Err(StorageError::AlreadyExistsConflict {
                    bucket: bucket.to_string(),
                    name: file.name,
                    version: file.version,
                });
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let info = NewObjectInfo {
            name: file.name,
            version: file.version,
            operation: Operation::Write,
            checksum: sum,
            size: file.content.len() as i64,
            created_at: truncate_to_millis(file.created_at),
            content_type: file.content_type,
            archetype: file.archetype,
            labels,
        };
        let fd = self.storage.write(bucket, &info, file.content).await?;
        Ok(SyncOutcome::Applied(fd))
    }

    /// Tombstone `name` at `version`. Deletes never conflict.
    pub async fn sync_file_delete(
        &self,
        bucket: &str,
        name: &str,
        version: &str,
        deleted_at: DateTime<Utc>,
    ) -> StorageResult<FileDescriptor> {
        validate_identifier("file id", name)?;
        validate_identifier("version", version)?;
        let (_, current) = self.storage.read(bucket, name, None).await?;

        let info = NewObjectInfo {
            name: name.to_string(),
            version: version.to_string(),
            operation: Operation::Delete,
            checksum: String::new(),
            size: 0,
            created_at: truncate_to_millis(deleted_at),
            content_type: current.content_type,
            archetype: current.archetype,
            labels: current.labels,
        };
        self.storage.write(bucket, &info, Bytes::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::MemoryBackend;
    use crate::services::key_provider::MemoryKeyProvider;
    use crate::services::object_store::EncryptedObjectStore;
    use chrono::{Duration, TimeZone};

    fn time1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 18, 15, 22, 46).unwrap() + Duration::milliseconds(123)
    }

    fn time2() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 26, 15, 16, 15).unwrap() + Duration::milliseconds(123)
    }

    fn reconciler() -> (SyncReconciler, Arc<EncryptedObjectStore>) {
        let storage = Arc::new(EncryptedObjectStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryKeyProvider::new()),
        ));
        (SyncReconciler::new(storage.clone()), storage)
    }

    fn incoming(version: &str, content: &'static [u8]) -> IncomingFile {
        IncomingFile {
            name: "FILE3".into(),
            version: version.into(),
            content: Bytes::from_static(content),
            content_type: "text/openEhrXml".into(),
            created_at: time2(),
            archetype: "openEHR-EHR-OBSERVATION.blood_pressure.v1".into(),
            labels: vec!["vitalSign".into()],
        }
    }

    #[tokio::test]
    async fn applies_new_version_with_origin_identity() {
        let (sync, storage) = reconciler();
        let outcome = sync.sync_file("BUCKET", incoming("V1", b"contents")).await.unwrap();

        assert!(outcome.is_applied());
        let fd = outcome.descriptor();
        assert_eq!(fd.version, "V1");
        assert_eq!(fd.created_at, time2());
        assert_eq!(fd.checksum, "0bKln76n4gB3r5-Rsn6V6GUGGycL4D_1Oas7c1h4gug");
        assert_eq!(fd.labels, vec!["vitalSign".to_string()]);

        let listed = storage.list("BUCKET", "").await.unwrap();
        assert_eq!(listed, vec![fd.clone()]);
    }

    #[tokio::test]
    async fn identical_replay_is_already_exists() {
        let (sync, storage) = reconciler();
        let first = sync
            .sync_file("BUCKET", incoming("V1", b"contents"))
            .await
            .unwrap()
            .into_descriptor();

        let mut replay = incoming("V1", b"contents");
        replay.created_at = time1();
        let second = sync.sync_file("BUCKET", replay).await.unwrap();

        assert_eq!(second, SyncOutcome::AlreadyExists(first));
        assert_eq!(storage.list("BUCKET", "").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn different_content_at_same_version_conflicts() {
        let (sync, storage) = reconciler();
        sync.sync_file("BUCKET", incoming("V1", b"contents")).await.unwrap();

        let result = sync.sync_file("BUCKET", incoming("V1", b"other contents")).await;
        assert!(matches!(
            result,
            Err(StorageError::AlreadyExistsConflict { ref version, .. }) if version == "V1"
        ));
        assert_eq!(storage.list("BUCKET", "").await.unwrap().len(), 1);

        let applied = sync.sync_file("BUCKET", incoming("V2", b"other contents")).await.unwrap();
        assert!(applied.is_applied());
    }

    #[tokio::test]
    async fn delete_carries_previous_metadata_forward() {
        let (sync, storage) = reconciler();
        sync.sync_file("BUCKET", incoming("V1", b"contents")).await.unwrap();

        let deleted_at = time2() + Duration::days(3);
        let tombstone = sync
            .sync_file_delete("BUCKET", "FILE3", "DEL_VERSION", deleted_at)
            .await
            .unwrap();

        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.version, "DEL_VERSION");
        assert_eq!(tombstone.size, 0);
        assert!(tombstone.checksum.is_empty());
        assert_eq!(tombstone.content_type, "text/openEhrXml");
        assert_eq!(tombstone.archetype, "openEHR-EHR-OBSERVATION.blood_pressure.v1");
        assert_eq!(tombstone.labels, vec!["vitalSign".to_string()]);
        assert_eq!(tombstone.created_at, deleted_at);

        let (_, latest) = storage.read("BUCKET", "FILE3", None).await.unwrap();
        assert_eq!(latest, tombstone);

        let again = sync
            .sync_file_delete("BUCKET", "FILE3", "DEL_VERSION_2", deleted_at + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(again.labels, tombstone.labels);
    }

    #[tokio::test]
    async fn delete_of_unknown_file_is_not_found() {
        let (sync, _) = reconciler();
        let err = sync
            .sync_file_delete("BUCKET", "FILE3", "DEL", time1())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn rejects_delimiters_in_identity() {
        let (sync, _) = reconciler();
        let result = sync.sync_file("BUCKET", incoming("V.1", b"contents")).await;
        assert!(matches!(result, Err(StorageError::BadRequest(_))));
    }
}
