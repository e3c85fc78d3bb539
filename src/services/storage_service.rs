//! src/services/storage_service.rs
//!
//! The object-store boundary the pipeline writes through, plus `DiskStore`,
//! the bundled backend: SQLite for object metadata (content type, cache
//! control, ACL, etag) and local disk for payloads sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{name}.{id}`. Each write gets a
//! fresh `id`, so a payload is never replaced in place.

use crate::models::object::{ObjectAttributes, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWriteExt},
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Byte stream handed to `ObjectStore::put_object`.
pub type ObjectBody = BoxStream<'static, io::Result<Bytes>>;

/// Payload reader returned by `ObjectStore::open_reader`.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{name}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, name: String },
    #[error("invalid object name")]
    InvalidObjectName,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of one readiness probe against a backend dependency.
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub ok: bool,
    pub error: Option<String>,
}

/// A single bucket of named objects.
///
/// Implementations are shared read-only across requests for the lifetime
/// of the process.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket every operation addresses.
    fn bucket(&self) -> &str;

    /// Stream `body` into the object `name`, replacing any previous payload.
    async fn put_object(
        &self,
        name: &str,
        body: ObjectBody,
        attrs: ObjectAttributes,
    ) -> StorageResult<StoredObject>;

    /// Metadata plus a reader positioned at the start of the payload.
    async fn open_reader(&self, name: &str) -> StorageResult<(StoredObject, ObjectReader)>;

    async fn head_object(&self, name: &str) -> StorageResult<StoredObject>;

    async fn delete_object(&self, name: &str) -> StorageResult<()>;

    async fn readiness(&self) -> Vec<ReadinessCheck> {
        Vec::new()
    }
}

/// Local-disk backend with SQLite metadata.
#[derive(Clone)]
pub struct DiskStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    bucket: String,
}

const MAX_OBJECT_NAME_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

impl DiskStore {
    /// Open the store for `bucket`, rejecting names a real bucket could not have.
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
    ) -> StorageResult<Self> {
        let bucket = bucket.into();
        ensure_bucket_name_safe(&bucket)?;
        Ok(Self {
            db,
            base_path: base_path.into(),
            bucket,
        })
    }

    /// Basic name validation to avoid trivial path traversal vectors.
    fn ensure_name_safe(&self, name: &str) -> StorageResult<()> {
        if name.is_empty() || name.len() > MAX_OBJECT_NAME_LEN {
            return Err(StorageError::InvalidObjectName);
        }
        if name.starts_with('/') || name.contains("..") {
            return Err(StorageError::InvalidObjectName);
        }
        if name
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectName);
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard identifiers: the first two bytes of MD5(bucket/name).
    fn object_shards(bucket: &str, name: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, name));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/bucket/{shard}/{shard}/{name}.{id}`. Parent directories may not exist yet.
    fn object_path(&self, name: &str, id: Uuid) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, name);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(format!("{}.{}", name, id.simple()));
        path
    }

    fn not_found(&self, name: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: self.bucket.clone(),
            name: name.to_string(),
        }
    }

    async fn current_id(&self, name: &str) -> StorageResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM objects WHERE bucket = ? AND name = ?",
        )
        .bind(&self.bucket)
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(id)
    }

    async fn fetch_object(&self, name: &str) -> StorageResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket, name, content_type, cache_control, acl, size_bytes,
                    etag, created_at
             FROM objects
             WHERE bucket = ? AND name = ?",
        )
        .bind(&self.bucket)
        .bind(name)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => self.not_found(name),
            other => StorageError::Sqlx(other),
        })
    }

    /// Remove empty shard directories up to (not including) the bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    async fn remove_payload(&self, name: &str, id: Uuid) {
        let path = self.object_path(name, id);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed physical file {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
            }
            Err(err) => warn!("failed to remove {}: {}", path.display(), err),
        }
    }

    async fn check_sqlite(&self) -> ReadinessCheck {
        let (ok, error) = match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
        {
            Ok(1) => (true, None),
            Ok(v) => (false, Some(format!("unexpected result: {}", v))),
            Err(e) => (false, Some(format!("error: {}", e))),
        };
        ReadinessCheck {
            name: "sqlite",
            ok,
            error,
        }
    }

    async fn check_disk(&self) -> ReadinessCheck {
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        let (ok, error) = match fs::write(&tmp_path, b"readyz").await {
            Ok(_) => match fs::read(&tmp_path).await {
                Ok(bytes) if bytes == b"readyz" => match fs::remove_file(&tmp_path).await {
                    Ok(_) => (true, None),
                    Err(e) => (true, Some(format!("could not remove tmp file: {}", e))),
                },
                Ok(_) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    (false, Some("file content mismatch".to_string()))
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    (false, Some(format!("could not read tmp file: {}", e)))
                }
            },
            Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
        };
        ReadinessCheck {
            name: "disk",
            ok,
            error,
        }
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Stream-upload an object to disk and record its metadata.
    ///
    /// Bytes go to a temp file while size and MD5 are computed, the file is
    /// fsynced and renamed to a path of its own, then the metadata row is
    /// upserted to point at it. On any error the new file is removed and a
    /// previous version stays readable. On success the previous payload is
    /// removed.
    async fn put_object(
        &self,
        name: &str,
        mut body: ObjectBody,
        attrs: ObjectAttributes,
    ) -> StorageResult<StoredObject> {
        self.ensure_name_safe(name)?;

        let id = Uuid::new_v4();
        let file_path = self.object_path(name, id);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        place_payload(&tmp_path, &file_path).await?;

        let previous = match self.current_id(name).await {
            Ok(previous) => previous,
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                return Err(err);
            }
        };

        let etag = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                id, bucket, name, content_type, cache_control, acl,
                size_bytes, etag, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, name) DO UPDATE SET
                id = excluded.id,
                content_type = excluded.content_type,
                cache_control = excluded.cache_control,
                acl = excluded.acl,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                created_at = excluded.created_at
            RETURNING id, bucket, name, content_type, cache_control, acl,
                      size_bytes, etag, created_at
            "#,
        )
        .bind(id)
        .bind(&self.bucket)
        .bind(name)
        .bind(&attrs.content_type)
        .bind(&attrs.cache_control)
        .bind(attrs.acl.as_str())
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                if let Some(previous) = previous.filter(|prev| *prev != id) {
                    self.remove_payload(name, previous).await;
                }
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Returns ObjectNotFound if metadata exists but the payload is missing.
    async fn open_reader(&self, name: &str) -> StorageResult<(StoredObject, ObjectReader)> {
        self.ensure_name_safe(name)?;
        let object = self.fetch_object(name).await?;

        let file = File::open(self.object_path(name, object.id))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    self.not_found(name)
                } else {
                    StorageError::Io(err)
                }
            })?;

        Ok((object, Box::new(file)))
    }

    async fn head_object(&self, name: &str) -> StorageResult<StoredObject> {
        self.ensure_name_safe(name)?;
        self.fetch_object(name).await
    }

    /// Delete the metadata row and the payload, then prune empty shards.
    async fn delete_object(&self, name: &str) -> StorageResult<()> {
        self.ensure_name_safe(name)?;

        let id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM objects WHERE bucket = ? AND name = ? RETURNING id",
        )
        .bind(&self.bucket)
        .bind(name)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| self.not_found(name))?;

        let file_path = self.object_path(name, id);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }

        Ok(())
    }

    /// SQLite `SELECT 1` plus a write/read/delete round trip under `base_path`.
    async fn readiness(&self) -> Vec<ReadinessCheck> {
        vec![self.check_sqlite().await, self.check_disk().await]
    }
}

/// Rename a finished temp file into place. The temp file never outlives a
/// failure.
async fn place_payload(tmp_path: &Path, file_path: &Path) -> io::Result<()> {
    let result = match fs::rename(tmp_path, file_path).await {
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            match fs::remove_file(file_path).await {
                Ok(_) => fs::rename(tmp_path, file_path).await,
                Err(err) => Err(err),
            }
        }
        other => other,
    };

    if result.is_err() {
        let _ = fs::remove_file(tmp_path).await;
    }
    result
}

/// Apply the embedded schema. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("Running {} migration statements", statements.len());

    for stmt in statements {
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Validate bucket name format.
///
/// S3/GCS-like rules: 3 to 63 characters of lowercase letters, digits, dots
/// and hyphens; no leading/trailing dot or hyphen; no `..`, `.-` or `-.`;
/// not shaped like an IPv4 address.
fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') || name.ends_with('-')
    {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}
