//! Versioned file semantics on top of [`ObjectStorage`].
//!
//! Every mutation writes a new immutable version, publishes a change event and
//! then refreshes the label collections the file belongs to. Collection
//! refreshes are best effort: failures are logged and never fail the call.

use crate::errors::{StorageError, StorageResult};
use crate::models::{BucketDescriptor, EventKind, FileDescriptor, FileInfo, NewObjectInfo, Operation};
use crate::services::checksum::checksum;
use crate::services::clock::{Clock, IdGenerator, MonotonicClock, SystemClock, UuidIds};
use crate::services::collection::{self, COLLECTION_CONTENT_TYPE, COLLECTION_LABEL};
use crate::services::object_key::{DELIMITER, ObjectKey};
use crate::services::object_store::{ObjectReader, ObjectStorage, read_to_bytes};
use crate::services::publisher::ChangePublisher;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Reject identifiers that would corrupt an object key or a descriptor path.
pub(crate) fn validate_identifier(kind: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::BadRequest(format!("{} must not be empty", kind)));
    }
    if value.contains(DELIMITER) || value.contains('/') {
        return Err(StorageError::BadRequest(format!(
            "{} `{}` must not contain '{}' or '/'",
            kind, value, DELIMITER
        )));
    }
    Ok(())
}

/// Validate labels and drop duplicates, keeping first-seen order.
pub(crate) fn normalize_labels(labels: Vec<String>) -> StorageResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        validate_identifier("label", &label)?;
        if !out.contains(&label) {
            out.push(label);
        }
    }
    Ok(out)
}

/// Create `bucket` unless it is already there.
pub(crate) async fn ensure_bucket(storage: &dyn ObjectStorage, bucket: &str) -> StorageResult<()> {
    match storage.make_bucket(bucket).await {
        Ok(()) => {
            info!(bucket = %bucket, "created bucket");
            Ok(())
        }
        Err(StorageError::BucketAlreadyExists(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

/// One descriptor per name: the newest by `created_at`, ties going to the
/// later entry in listing order.
pub(crate) fn latest_per_name(listing: Vec<FileDescriptor>) -> Vec<FileDescriptor> {
    let mut latest: BTreeMap<String, FileDescriptor> = BTreeMap::new();
    for fd in listing {
        match latest.get(&fd.name) {
            Some(current) if current.created_at > fd.created_at => {}
            _ => {
                latest.insert(fd.name.clone(), fd);
            }
        }
    }
    latest.into_values().collect()
}

pub(crate) fn file_info(bucket: &str, fd: &FileDescriptor) -> FileInfo {
    FileInfo::new(bucket, fd.name.clone(), fd.version.clone(), fd.created_at)
}

enum CollectionChange<'a> {
    Upsert(&'a FileDescriptor),
    Remove(&'a str),
}

pub struct FileService {
    storage: Arc<dyn ObjectStorage>,
    publisher: Arc<dyn ChangePublisher>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl FileService {
    pub fn new(storage: Arc<dyn ObjectStorage>, publisher: Arc<dyn ChangePublisher>) -> Self {
        Self {
            storage,
            publisher,
            clock: Arc::new(MonotonicClock::new(Arc::new(SystemClock))),
            ids: Arc::new(UuidIds),
        }
    }

    /// Readings are made strictly increasing so version order never ties.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Arc::new(MonotonicClock::new(clock));
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketDescriptor>> {
        self.storage.list_buckets().await
    }

    /// Live files in `bucket`, newest version of each. A missing bucket is empty.
    pub async fn list(&self, bucket: &str) -> StorageResult<Vec<FileDescriptor>> {
        Ok(self
            .sync_list(bucket)
            .await?
            .into_iter()
            .filter(|fd| !fd.is_deleted())
            .collect())
    }

    /// Like [`FileService::list`] but keeps files whose newest version is a tombstone.
    pub async fn sync_list(&self, bucket: &str) -> StorageResult<Vec<FileDescriptor>> {
        if !self.storage.bucket_exists(bucket).await? {
            return Ok(Vec::new());
        }
        let listing = self.storage.list(bucket, "").await?;
        Ok(latest_per_name(listing))
    }

    pub async fn get(
        &self,
        bucket: &str,
        file_id: &str,
    ) -> StorageResult<(ObjectReader, FileDescriptor)> {
        validate_identifier("file id", file_id)?;
        let (reader, fd) = self.storage.read(bucket, file_id, None).await?;
        if fd.is_deleted() {
            return Err(StorageError::not_found(bucket, file_id));
        }
        Ok((reader, fd))
    }

    pub async fn get_version(
        &self,
        bucket: &str,
        file_id: &str,
        version: &str,
    ) -> StorageResult<(ObjectReader, FileDescriptor)> {
        validate_identifier("file id", file_id)?;
        validate_identifier("version", version)?;
        let (reader, fd) = self.storage.read(bucket, file_id, Some(version)).await?;
        if fd.is_deleted() {
            return Err(StorageError::not_found(bucket, file_id));
        }
        Ok((reader, fd))
    }

    /// Full history of `file_id`, newest first, tombstones included.
    pub async fn list_versions(&self, bucket: &str, file_id: &str) -> StorageResult<Vec<FileDescriptor>> {
        validate_identifier("file id", file_id)?;
        let mut versions = self
            .storage
            .list(bucket, &ObjectKey::name_prefix(file_id))
            .await?;
        if versions.is_empty() {
            return Err(StorageError::not_found(bucket, file_id));
        }
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(versions)
    }

    pub async fn new_file(
        &self,
        bucket: &str,
        content: Bytes,
        content_type: &str,
        archetype: &str,
        labels: Vec<String>,
    ) -> StorageResult<FileDescriptor> {
        let labels = normalize_labels(labels)?;
        ensure_bucket(self.storage.as_ref(), bucket).await?;

        let file_id = self.ids.generate();
        validate_identifier("generated file id", &file_id)?;
        let fd = self
            .write_version(bucket, &file_id, Operation::Write, content, content_type, archetype, labels)
            .await?;
        info!(bucket = %bucket, file = %fd.name, version = %fd.version, size = fd.size, "file created");
        self.publisher
            .publish_async_with_retries(EventKind::FileNew, file_info(bucket, &fd));

        for label in &fd.labels {
            self.refresh_collection(bucket, label, CollectionChange::Upsert(&fd))
                .await;
        }
        Ok(fd)
    }

    pub async fn update(
        &self,
        bucket: &str,
        file_id: &str,
        content: Bytes,
        content_type: &str,
        archetype: &str,
        labels: Vec<String>,
    ) -> StorageResult<FileDescriptor> {
        validate_identifier("file id", file_id)?;
        let labels = normalize_labels(labels)?;
        let current = self.current(bucket, file_id).await?;

        let fd = self
            .write_version(bucket, file_id, Operation::Write, content, content_type, archetype, labels)
            .await?;
        info!(bucket = %bucket, file = %fd.name, version = %fd.version, size = fd.size, "file updated");
        self.publisher
            .publish_async_with_retries(EventKind::FileUpdate, file_info(bucket, &fd));

        for label in &fd.labels {
            self.refresh_collection(bucket, label, CollectionChange::Upsert(&fd))
                .await;
        }
        for label in current.labels.iter().filter(|l| !fd.labels.contains(l)) {
            self.refresh_collection(bucket, label, CollectionChange::Remove(file_id))
                .await;
        }
        Ok(fd)
    }

    /// Tombstone `file_id`. The tombstone keeps the previous content type,
    /// archetype and labels.
    pub async fn delete(&self, bucket: &str, file_id: &str) -> StorageResult<FileDescriptor> {
        validate_identifier("file id", file_id)?;
        let current = self.current(bucket, file_id).await?;

        let fd = self
            .write_version(
                bucket,
                file_id,
                Operation::Delete,
                Bytes::new(),
                &current.content_type,
                &current.archetype,
                current.labels.clone(),
            )
            .await?;
        info!(bucket = %bucket, file = %fd.name, version = %fd.version, "file deleted");
        self.publisher
            .publish_async_with_retries(EventKind::FileDelete, file_info(bucket, &fd));

        for label in &current.labels {
            self.refresh_collection(bucket, label, CollectionChange::Remove(file_id))
                .await;
        }
        Ok(fd)
    }

    /// Newest version of a live file.
    async fn current(&self, bucket: &str, file_id: &str) -> StorageResult<FileDescriptor> {
        let (_, fd) = self.storage.read(bucket, file_id, None).await?;
        if fd.is_deleted() {
            return Err(StorageError::not_found(bucket, file_id));
        }
        Ok(fd)
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_version(
        &self,
        bucket: &str,
        name: &str,
        operation: Operation,
        content: Bytes,
        content_type: &str,
        archetype: &str,
        labels: Vec<String>,
    ) -> StorageResult<FileDescriptor> {
        let sum = match operation {
            Operation::Write => checksum(&content),
            Operation::Delete => String::new(),
        };
        let version = self.ids.generate();
        validate_identifier("generated version", &version)?;
        let info = NewObjectInfo {
            name: name.to_string(),
            version,
            operation,
            checksum: sum,
            size: content.len() as i64,
            created_at: self.clock.now(),
            content_type: content_type.to_string(),
            archetype: archetype.to_string(),
            labels,
        };
        self.storage.write(bucket, &info, content).await
    }

    async fn refresh_collection(&self, bucket: &str, label: &str, change: CollectionChange<'_>) {
        match self.try_refresh_collection(bucket, label, change).await {
            Ok(Some(fd)) => self
                .publisher
                .publish_async_with_retries(EventKind::FileUpdate, file_info(bucket, &fd)),
            Ok(None) => {}
            Err(err) => warn!(bucket = %bucket, label = %label, "collection refresh failed: {}", err),
        }
    }

    /// Read-modify-write of one collection. `None` when nothing had to change.
    async fn try_refresh_collection(
        &self,
        bucket: &str,
        label: &str,
        change: CollectionChange<'_>,
    ) -> StorageResult<Option<FileDescriptor>> {
        let mut entries = match self.storage.read(bucket, label, None).await {
            Ok((reader, _)) => collection::decode(&read_to_bytes(reader).await?)?,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };

        match change {
            CollectionChange::Upsert(fd) => collection::upsert(&mut entries, fd.clone()),
            CollectionChange::Remove(name) => {
                if !collection::remove(&mut entries, name) {
                    return Ok(None);
                }
            }
        }

        let content = collection::encode(&entries)?;
        let fd = self
            .write_version(
                bucket,
                label,
                Operation::Write,
                content,
                COLLECTION_CONTENT_TYPE,
                "",
                vec![COLLECTION_LABEL.to_string()],
            )
            .await?;
        Ok(Some(fd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::{BlobBackend, MemoryBackend};
    use crate::services::clock::{FixedClock, SequenceIds};
    use std::collections::VecDeque;
    use crate::services::key_provider::MemoryKeyProvider;
    use crate::services::object_store::EncryptedObjectStore;
    use crate::services::publisher::{MemoryTransport, RetryPolicy, RetryingPublisher};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    /// Advances one second on every call.
    struct TickingClock(Mutex<DateTime<Utc>>);

    impl Clock for TickingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(1);
            *now
        }
    }

    /// Hands out the given ids in order.
    struct ScriptedIds(Mutex<VecDeque<&'static str>>);

    impl ScriptedIds {
        fn new(ids: &[&'static str]) -> Self {
            Self(Mutex::new(ids.iter().copied().collect()))
        }
    }

    impl IdGenerator for ScriptedIds {
        fn generate(&self) -> String {
            self.0.lock().unwrap().pop_front().unwrap().to_string()
        }
    }

    struct Fixture {
        service: FileService,
        backend: Arc<MemoryBackend>,
        transport: Arc<MemoryTransport>,
        publisher: Arc<RetryingPublisher<MemoryTransport>>,
    }

    impl Fixture {
        async fn events(&self) -> Vec<(EventKind, String)> {
            self.publisher.close().await;
            let mut events: Vec<(EventKind, String)> = self
                .transport
                .events()
                .await
                .into_iter()
                .map(|(kind, info)| (kind, info.file_id))
                .collect();
            events.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.as_str().cmp(b.0.as_str())));
            events
        }

        async fn collection(&self, label: &str) -> StorageResult<Vec<FileDescriptor>> {
            let (reader, fd) = self.service.storage.read("BUCKET", label, None).await?;
            assert_eq!(fd.content_type, COLLECTION_CONTENT_TYPE);
            assert_eq!(fd.labels, vec![COLLECTION_LABEL.to_string()]);
            collection::decode(&read_to_bytes(reader).await?)
        }
    }

    fn fixture() -> Fixture {
        let start = Utc.with_ymd_and_hms(2018, 1, 18, 15, 22, 46).unwrap();
        fixture_with(
            Arc::new(TickingClock(Mutex::new(start))),
            Arc::new(SequenceIds::new("ID")),
        )
    }

    fn fixture_with(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let storage = Arc::new(EncryptedObjectStore::new(
            backend.clone(),
            Arc::new(MemoryKeyProvider::new()),
        ));
        let transport = Arc::new(MemoryTransport::new());
        let publisher = Arc::new(RetryingPublisher::new(
            transport.clone(),
            RetryPolicy {
                initial_backoff: std::time::Duration::from_millis(1),
                max_backoff: std::time::Duration::from_millis(4),
                drain_timeout: None,
            },
        ));
        let service = FileService::new(storage, publisher.clone())
            .with_clock(clock)
            .with_ids(ids);
        Fixture {
            service,
            backend,
            transport,
            publisher,
        }
    }

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    async fn create(fx: &Fixture, content: &'static [u8], with: &[&str]) -> FileDescriptor {
        fx.service
            .new_file(
                "BUCKET",
                Bytes::from_static(content),
                "text/openEhrXml",
                "openEHR-EHR-OBSERVATION.blood_pressure.v1",
                labels(with),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn new_file_is_indexed_in_every_label_collection() {
        let fx = fixture();
        let fd = create(&fx, b"contents", &["vitalSign", "basicPatientInfo"]).await;

        assert_eq!(fd.name, "ID-1");
        assert_eq!(fd.version, "ID-2");
        assert_eq!(fd.checksum, "0bKln76n4gB3r5-Rsn6V6GUGGycL4D_1Oas7c1h4gug");
        assert_eq!(fd.size, 8);
        assert_eq!(fd.path, "BUCKET/ID-1/ID-2");

        assert_eq!(fx.collection("vitalSign").await.unwrap(), vec![fd.clone()]);
        assert_eq!(fx.collection("basicPatientInfo").await.unwrap(), vec![fd.clone()]);

        assert_eq!(
            fx.events().await,
            vec![
                (EventKind::FileNew, "ID-1".to_string()),
                (EventKind::FileUpdate, "basicPatientInfo".to_string()),
                (EventKind::FileUpdate, "vitalSign".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn collection_failure_does_not_fail_new_file() {
        let fx = fixture();
        fx.backend.make_bucket("BUCKET").await.unwrap();
        fx.backend.fail_puts_with_prefix("basicPatientInfo.").await;

        let fd = create(&fx, b"contents", &["vitalSign", "basicPatientInfo"]).await;

        assert_eq!(fx.collection("vitalSign").await.unwrap(), vec![fd.clone()]);
        assert!(fx.collection("basicPatientInfo").await.unwrap_err().is_not_found());
        assert_eq!(fx.service.list("BUCKET").await.unwrap().len(), 2);

        let events = fx.events().await;
        assert!(!events.iter().any(|(_, id)| id == "basicPatientInfo"));
    }

    #[tokio::test]
    async fn primary_write_failure_is_surfaced() {
        let fx = fixture();
        fx.backend.make_bucket("BUCKET").await.unwrap();
        fx.backend.fail_puts_with_prefix("ID-1.").await;

        let result = fx
            .service
            .new_file("BUCKET", Bytes::from_static(b"x"), "text/plain", "", labels(&["vitalSign"]))
            .await;
        assert!(matches!(result, Err(StorageError::Backend(_))));
        assert!(fx.events().await.is_empty());
    }

    #[tokio::test]
    async fn update_moves_file_between_collections() {
        let fx = fixture();
        let v1 = create(&fx, b"contents", &["vitalSign", "basicPatientInfo"]).await;

        let v2 = fx
            .service
            .update(
                "BUCKET",
                &v1.name,
                Bytes::from_static(b"contents v2"),
                "text/openEhrXml",
                "openEHR-EHR-OBSERVATION.blood_pressure.v1",
                labels(&["vitalSign"]),
            )
            .await
            .unwrap();

        assert_eq!(v2.name, v1.name);
        assert_ne!(v2.version, v1.version);
        assert!(v2.created_at > v1.created_at);
        assert_eq!(fx.collection("vitalSign").await.unwrap(), vec![v2.clone()]);
        assert!(fx.collection("basicPatientInfo").await.unwrap().is_empty());

        let listed = fx.service.list("BUCKET").await.unwrap();
        let file = listed.iter().find(|fd| fd.name == v1.name).unwrap();
        assert_eq!(file.version, v2.version);
    }

    #[tokio::test]
    async fn update_then_delete_hides_file_from_list_only() {
        let fx = fixture();
        let v1 = create(&fx, b"contents", &["basicPatientInfo"]).await;
        fx.service
            .update(
                "BUCKET",
                &v1.name,
                Bytes::from_static(b"again"),
                "text/openEhrXml",
                "ARCH",
                labels(&["basicPatientInfo"]),
            )
            .await
            .unwrap();
        let tombstone = fx.service.delete("BUCKET", &v1.name).await.unwrap();

        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.size, 0);
        assert!(tombstone.checksum.is_empty());
        assert_eq!(tombstone.content_type, "text/openEhrXml");
        assert_eq!(tombstone.archetype, "ARCH");
        assert_eq!(tombstone.labels, labels(&["basicPatientInfo"]));

        let listed = fx.service.list("BUCKET").await.unwrap();
        assert!(listed.iter().all(|fd| fd.name != v1.name));

        let synced = fx.service.sync_list("BUCKET").await.unwrap();
        let entry = synced.iter().find(|fd| fd.name == v1.name).unwrap();
        assert_eq!(entry.operation, Operation::Delete);
        assert_eq!(entry.version, tombstone.version);

        assert!(fx.collection("basicPatientInfo").await.unwrap().is_empty());

        let events = fx.events().await;
        assert!(events.contains(&(EventKind::FileDelete, v1.name.clone())));
    }

    #[tokio::test]
    async fn deleted_files_cannot_be_read_or_changed() {
        let fx = fixture();
        let v1 = create(&fx, b"contents", &[]).await;
        fx.service.delete("BUCKET", &v1.name).await.unwrap();

        assert!(fx.service.get("BUCKET", &v1.name).await.err().unwrap().is_not_found());
        assert!(fx.service.delete("BUCKET", &v1.name).await.unwrap_err().is_not_found());
        let update = fx
            .service
            .update("BUCKET", &v1.name, Bytes::new(), "text/plain", "", vec![])
            .await;
        assert!(update.unwrap_err().is_not_found());

        let versions = fx.service.list_versions("BUCKET", &v1.name).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions[0].is_deleted());
        assert_eq!(versions[1].version, v1.version);
    }

    #[tokio::test]
    async fn get_and_get_version_return_content() {
        let fx = fixture();
        let v1 = create(&fx, b"first", &[]).await;
        let v2 = fx
            .service
            .update("BUCKET", &v1.name, Bytes::from_static(b"second"), "text/plain", "", vec![])
            .await
            .unwrap();

        let (reader, fd) = fx.service.get("BUCKET", &v1.name).await.unwrap();
        assert_eq!(fd, v2);
        assert_eq!(&read_to_bytes(reader).await.unwrap()[..], b"second");

        let (reader, fd) = fx.service.get_version("BUCKET", &v1.name, &v1.version).await.unwrap();
        assert_eq!(fd, v1);
        assert_eq!(&read_to_bytes(reader).await.unwrap()[..], b"first");

        assert!(
            fx.service
                .get_version("BUCKET", &v1.name, "missing")
                .await
                .err().unwrap()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn missing_bucket_lists_as_empty() {
        let fx = fixture();
        assert!(fx.service.list("NOPE").await.unwrap().is_empty());
        assert!(fx.service.sync_list("NOPE").await.unwrap().is_empty());
        assert!(fx.service.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn identifiers_are_validated() {
        let fx = fixture();
        let bad_label = fx
            .service
            .new_file("BUCKET", Bytes::new(), "text/plain", "", labels(&["vital.sign"]))
            .await;
        assert!(matches!(bad_label, Err(StorageError::BadRequest(_))));

        assert!(matches!(
            fx.service.delete("BUCKET", "a/b").await,
            Err(StorageError::BadRequest(_))
        ));
        assert!(matches!(
            fx.service.list_versions("BUCKET", "").await,
            Err(StorageError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn writes_in_the_same_millisecond_keep_their_order() {
        let start = Utc.with_ymd_and_hms(2018, 1, 18, 15, 22, 46).unwrap();
        // The second collection version sorts before the first by key.
        let fx = fixture_with(
            Arc::new(FixedClock(start)),
            Arc::new(ScriptedIds::new(&["F1", "Z1", "Z2", "F2", "Z3", "A1"])),
        );
        let first = create(&fx, b"first", &["vitalSign"]).await;
        let second = create(&fx, b"second", &["vitalSign"]).await;

        assert!(second.created_at > first.created_at);
        let names: Vec<String> = fx
            .collection("vitalSign")
            .await
            .unwrap()
            .into_iter()
            .map(|fd| fd.name)
            .collect();
        assert_eq!(names, vec!["F1".to_string(), "F2".to_string()]);

        let listed = fx.service.list("BUCKET").await.unwrap();
        let collection = listed.iter().find(|fd| fd.name == "vitalSign").unwrap();
        assert_eq!(collection.version, "A1");
    }

    #[tokio::test]
    async fn generated_ids_must_be_key_safe() {
        let start = Utc.with_ymd_and_hms(2018, 1, 18, 15, 22, 46).unwrap();
        let fx = fixture_with(
            Arc::new(FixedClock(start)),
            Arc::new(ScriptedIds::new(&["bad.id"])),
        );
        let result = fx
            .service
            .new_file("BUCKET", Bytes::from_static(b"x"), "text/plain", "", vec![])
            .await;
        assert!(matches!(result, Err(StorageError::BadRequest(_))));

        let fx = fixture_with(
            Arc::new(FixedClock(start)),
            Arc::new(ScriptedIds::new(&["F1", "V/1"])),
        );
        let result = fx
            .service
            .new_file("BUCKET", Bytes::from_static(b"x"), "text/plain", "", vec![])
            .await;
        assert!(matches!(result, Err(StorageError::BadRequest(_))));
        assert!(fx.events().await.is_empty());
    }

    #[test]
    fn latest_per_name_prefers_newest_then_later_entry() {
        let t = Utc.with_ymd_and_hms(2018, 1, 18, 15, 22, 46).unwrap();
        let fd = |name: &str, version: &str, offset: i64| FileDescriptor {
            name: name.into(),
            version: version.into(),
            path: String::new(),
            checksum: String::new(),
            content_type: String::new(),
            archetype: String::new(),
            size: 0,
            created_at: t + Duration::seconds(offset),
            operation: Operation::Write,
            labels: vec![],
        };
        let latest = latest_per_name(vec![
            fd("A", "V2", 5),
            fd("A", "V1", 1),
            fd("B", "V1", 3),
            fd("B", "V2", 3),
        ]);
        let picked: Vec<&str> = latest.iter().map(|fd| fd.version.as_str()).collect();
        assert_eq!(picked, vec!["V2", "V2"]);
    }

    #[test]
    fn labels_are_deduplicated() {
        assert_eq!(
            normalize_labels(labels(&["a", "b", "a"])).unwrap(),
            labels(&["a", "b"])
        );
    }
}
