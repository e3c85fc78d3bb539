//! Represents an object (derivative payload) stored in the configured bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Access rule recorded with every stored object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectAcl {
    Private,
    PublicRead,
}

impl ObjectAcl {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectAcl::Private => "private",
            ObjectAcl::PublicRead => "public-read",
        }
    }

    /// Unknown values are treated as private.
    pub fn parse(value: &str) -> Self {
        match value {
            "public-read" => ObjectAcl::PublicRead,
            _ => ObjectAcl::Private,
        }
    }
}

/// Metadata the writer attaches to a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectAttributes {
    pub content_type: String,
    pub cache_control: String,
    pub acl: ObjectAcl,
}

/// Metadata row for a single stored payload.
///
/// The payload bytes live on disk; this struct only mirrors the SQLite row.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Bucket the object belongs to.
    pub bucket: String,

    /// Object name (`<timestamp>-<uuid>.<ext>` for derivatives).
    pub name: String,

    /// Content type (MIME type).
    pub content_type: String,

    /// Value served in the `Cache-Control` header.
    pub cache_control: String,

    /// Serialized `ObjectAcl`.
    pub acl: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// When the payload was written.
    pub created_at: DateTime<Utc>,
}

impl StoredObject {
    pub fn acl(&self) -> ObjectAcl {
        ObjectAcl::parse(&self.acl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acl_round_trips_through_text() {
        assert_eq!(ObjectAcl::parse(ObjectAcl::PublicRead.as_str()), ObjectAcl::PublicRead);
        assert_eq!(ObjectAcl::parse("authenticated-read"), ObjectAcl::Private);
    }
}
