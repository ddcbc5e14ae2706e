//! DiskBackend: SQLite index of bucket and object keys plus sealed payloads on
//! local disk, sharded beneath `base_path/{bucket}/{shard}/{shard}/{digest}`.
//! Payload files are named by the MD5 hex of `bucket/key`; the index keeps the
//! real key, so key length is not bounded by file name limits.
//!
//! The index is what makes prefix listing cheap; payload files are only
//! touched on put and get. Writes go through a temp file that is fsynced and
//! renamed into place before the index row is upserted.

use super::{BlobBackend, EntryStream, ObjectEntry, ObjectMeta, ensure_bucket_name_safe, ensure_key_safe};
use crate::errors::{StorageError, StorageResult};
use crate::models::BucketDescriptor;
use crate::services::crypto::EncryptionKey;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Schema applied by [`DiskBackend::migrate`].
const INIT_SCHEMA: &str = include_str!("../../../migrations/0001_init.sql");

#[derive(FromRow, Debug)]
struct BucketRecord {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow, Debug)]
struct ObjectRecord {
    key: String,
    content_type: String,
    size_bytes: i64,
    labels: String,
}

impl ObjectRecord {
    fn into_entry(self) -> StorageResult<ObjectEntry> {
        let labels: Vec<String> = serde_json::from_str(&self.labels).map_err(|err| {
            StorageError::Backend(format!("labels of `{}` are unreadable: {}", self.key, err))
        })?;
        Ok(ObjectEntry {
            key: self.key,
            size: self.size_bytes,
            content_type: self.content_type,
            labels,
        })
    }
}

#[derive(Clone)]
pub struct DiskBackend {
    /// Shared SQLite connection pool holding the bucket and key index.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where sealed payloads are stored.
    pub base_path: PathBuf,
}

impl DiskBackend {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = INIT_SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} migration statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Lightweight `SELECT 1` against the index.
    pub async fn ping_database(&self) -> StorageResult<()> {
        let value = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if value != 1 {
            return Err(StorageError::Backend(format!(
                "unexpected ping result: {}",
                value
            )));
        }
        Ok(())
    }

    /// Write, read back and delete a probe file under `base_path`.
    pub async fn probe_disk(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Backend("probe file content mismatch".into()));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories and the file name, all from MD5(bucket/key).
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        let mut path = self.bucket_root(bucket_name);
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    async fn find_bucket(&self, bucket: &str) -> StorageResult<Option<BucketRecord>> {
        ensure_bucket_name_safe(bucket)?;
        let record = sqlx::query_as::<Sqlite, BucketRecord>(
            "SELECT id, name, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<BucketRecord> {
        self.find_bucket(bucket)
            .await?
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }

    /// Write `sealed` to a temp file next to `file_path`, fsync, then rename into place.
    async fn write_payload(&self, file_path: &Path, sealed: &[u8]) -> StorageResult<()> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result: io::Result<()> = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(sealed).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, file_path).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobBackend for DiskBackend {
    async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
        ensure_bucket_name_safe(bucket)?;
        fs::create_dir_all(self.bucket_root(bucket)).await?;

        match sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind(bucket)
            .bind(Utc::now())
            .execute(&*self.db)
            .await
        {
            Ok(_) => {
                debug!(bucket = %bucket, "bucket created");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::BucketAlreadyExists(bucket.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.find_bucket(bucket).await?.is_some())
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketDescriptor>> {
        let records = sqlx::query_as::<Sqlite, BucketRecord>(
            "SELECT id, name, created_at FROM buckets ORDER BY name ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(records
            .into_iter()
            .map(|r| BucketDescriptor {
                name: r.name,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<EntryStream> {
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT key, content_type, size_bytes, labels FROM objects WHERE bucket_id = ",
        );
        builder.push_bind(bucket_rec.id);
        if !prefix.is_empty() {
            // instr() avoids LIKE wildcards, which occur in real keys ('_').
            builder.push(" AND instr(key, ");
            builder.push_bind(prefix.to_string());
            builder.push(") = 1");
        }
        builder.push(" ORDER BY key ASC");

        let rows: Vec<ObjectRecord> = builder.build_query_as().fetch_all(&*self.db).await?;
        debug!(bucket = %bucket, prefix = %prefix, count = rows.len(), "listed objects");

        let entries: Vec<StorageResult<ObjectEntry>> =
            rows.into_iter().map(ObjectRecord::into_entry).collect();
        Ok(stream::iter(entries).boxed())
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
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let sealed = key.seal(&data)?;
        let size = data.len() as i64;
        let file_path = self.object_path(&bucket_rec.name, object_key);
        self.write_payload(&file_path, &sealed).await?;

        let labels = serde_json::to_string(&meta.labels)?;
        let insert = sqlx::query(
            r#"
            INSERT INTO objects (id, bucket_id, key, content_type, size_bytes, labels, stored_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                labels = excluded.labels,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(object_key)
        .bind(&meta.content_type)
        .bind(size)
        .bind(labels)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        match insert {
            Ok(_) => {
                debug!(bucket = %bucket, key = %object_key, size, "stored object");
                Ok(size)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    async fn get_encrypted(
        &self,
        bucket: &str,
        object_key: &str,
        key: &EncryptionKey,
    ) -> StorageResult<Bytes> {
        ensure_key_safe(object_key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let indexed = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM objects WHERE bucket_id = ? AND key = ?",
        )
        .bind(bucket_rec.id)
        .bind(object_key)
        .fetch_one(&*self.db)
        .await?;
        if indexed == 0 {
            return Err(StorageError::not_found(bucket, object_key));
        }

        let file_path = self.object_path(&bucket_rec.name, object_key);
        let sealed = fs::read(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::not_found(bucket, object_key)
            } else {
                StorageError::Io(err)
            }
        })?;
        Ok(Bytes::from(key.open(&sealed)?))
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
