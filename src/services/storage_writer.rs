//! Storage Writer: the process-wide handle derivatives are written through.

use crate::{
    models::object::{ObjectAcl, ObjectAttributes},
    services::storage_service::{ObjectBody, ObjectStore, StorageError, StorageResult},
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{io, sync::Arc};
use tracing::debug;

/// Chunk size used when streaming an encoded derivative to the store.
const WRITE_CHUNK_BYTES: usize = 64 * 1024;

/// Writes public, cacheable objects into one bucket and computes their URLs.
///
/// Built once at startup and cloned into every request; nothing in it is
/// mutated afterwards.
#[derive(Clone)]
pub struct StorageWriter {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
    cache_max_age: u64,
}

impl StorageWriter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        public_base_url: impl Into<String>,
        cache_max_age: u64,
    ) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            cache_max_age,
        }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// `<base>/<bucket>/<name>`; a pure function of configuration and name.
    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket(), name)
    }

    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_max_age)
    }

    /// Stream `bytes` into `name` with public-read access and return its URL.
    pub async fn write(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        let url = self.public_url(name);
        let attrs = ObjectAttributes {
            content_type: content_type.to_string(),
            cache_control: self.cache_control(),
            acl: ObjectAcl::PublicRead,
        };

        let stored = self.store.put_object(name, chunked(bytes), attrs).await?;
        debug!(
            object = %name,
            size_bytes = stored.size_bytes,
            etag = %stored.etag,
            "stored derivative"
        );
        Ok(url)
    }

    /// Delete `name`. Callers decide whether the error matters; cleanup
    /// paths only log it.
    pub async fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.store.delete_object(name).await
    }
}

fn chunked(bytes: Bytes) -> ObjectBody {
    let chunks: Vec<io::Result<Bytes>> = (0..bytes.len())
        .step_by(WRITE_CHUNK_BYTES)
        .map(|start| {
            let end = (start + WRITE_CHUNK_BYTES).min(bytes.len());
            Ok(bytes.slice(start..end))
        })
        .collect();
    stream::iter(chunks).boxed()
}
