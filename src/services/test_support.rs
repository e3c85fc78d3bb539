//! Fixtures shared by the unit tests: an in-memory `ObjectStore`, generated
//! images and an in-memory SQLite pool.

use crate::{
    models::object::{ObjectAttributes, StoredObject},
    services::storage_service::{
        ObjectBody, ObjectReader, ObjectStore, StorageError, StorageResult, run_migrations,
    },
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::StreamExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{
    collections::HashMap,
    io::{self, Cursor},
    sync::Mutex,
    time::Duration,
};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RecordedPut {
    pub name: String,
    pub bytes: Bytes,
    pub chunks: usize,
    pub attrs: ObjectAttributes,
}

/// Records every put and delete; failures can be injected.
pub struct FakeStore {
    bucket: String,
    fail_put_on: Option<usize>,
    fail_delete_of: Vec<String>,
    put_attempts: Mutex<usize>,
    puts: Mutex<Vec<RecordedPut>>,
    objects: Mutex<HashMap<String, (StoredObject, Bytes)>>,
    deletes: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            fail_put_on: None,
            fail_delete_of: Vec::new(),
            put_attempts: Mutex::new(0),
            puts: Mutex::new(Vec::new()),
            objects: Mutex::new(HashMap::new()),
            deletes: Mutex::new(Vec::new()),
        }
    }

    /// Fail the n-th put (1-based).
    pub fn fail_put_on(mut self, attempt: usize) -> Self {
        self.fail_put_on = Some(attempt);
        self
    }

    pub fn fail_delete_of(mut self, name: &str) -> Self {
        self.fail_delete_of.push(name.to_string());
        self
    }

    /// Successful puts, in order.
    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap().clone()
    }

    /// Every attempted delete, in arrival order.
    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    /// Poll until `count` deletes have been attempted, or panic after 5s.
    pub async fn wait_for_deletes(&self, count: usize) {
        for _ in 0..500 {
            if self.deletes.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} deletes, saw {:?}",
            self.deletes.lock().unwrap()
        );
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(
        &self,
        name: &str,
        mut body: ObjectBody,
        attrs: ObjectAttributes,
    ) -> StorageResult<StoredObject> {
        let attempt = {
            let mut attempts = self.put_attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };

        let mut buf = BytesMut::new();
        let mut chunks = 0;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
            chunks += 1;
        }

        if self.fail_put_on == Some(attempt) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "quota exceeded",
            )));
        }

        let bytes = buf.freeze();
        let object = StoredObject {
            id: Uuid::new_v4(),
            bucket: self.bucket.clone(),
            name: name.to_string(),
            content_type: attrs.content_type.clone(),
            cache_control: attrs.cache_control.clone(),
            acl: attrs.acl.as_str().to_string(),
            size_bytes: bytes.len() as i64,
            etag: format!("{:x}", md5::compute(&bytes)),
            created_at: Utc::now(),
        };

        self.puts.lock().unwrap().push(RecordedPut {
            name: name.to_string(),
            bytes: bytes.clone(),
            chunks,
            attrs,
        });
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), (object.clone(), bytes));
        Ok(object)
    }

    async fn open_reader(&self, name: &str) -> StorageResult<(StoredObject, ObjectReader)> {
        let (object, bytes) = self.lookup(name)?;
        Ok((object, Box::new(Cursor::new(bytes.to_vec()))))
    }

    async fn head_object(&self, name: &str) -> StorageResult<StoredObject> {
        self.lookup(name).map(|(object, _)| object)
    }

    async fn delete_object(&self, name: &str) -> StorageResult<()> {
        self.deletes.lock().unwrap().push(name.to_string());
        if self.fail_delete_of.iter().any(|n| n == name) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "backend timed out",
            )));
        }
        self.objects.lock().unwrap().remove(name);
        Ok(())
    }
}

impl FakeStore {
    fn lookup(&self, name: &str) -> StorageResult<(StoredObject, Bytes)> {
        self.objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: self.bucket.clone(),
                name: name.to_string(),
            })
    }
}

/// Gradient so encoders have something non-trivial to compress.
fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7) as u8, (y * 13) as u8, ((x + y) * 3) as u8])
    }))
}

pub fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

pub fn encode_png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Splice an APP1 segment holding a single Orientation tag right after SOI.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    assert_eq!(&jpeg[0..2], &[0xFF, 0xD8], "not a JPEG");

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2A");
    tiff.extend_from_slice(&8u32.to_be_bytes()); // IFD0 offset
    tiff.extend_from_slice(&1u16.to_be_bytes()); // entry count
    tiff.extend_from_slice(&0x0112u16.to_be_bytes()); // Orientation
    tiff.extend_from_slice(&3u16.to_be_bytes()); // SHORT
    tiff.extend_from_slice(&1u32.to_be_bytes()); // count
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes()); // no next IFD

    let mut payload = b"Exif\x00\x00".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[0..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Single-connection in-memory SQLite with the schema applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
