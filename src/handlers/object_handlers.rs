//! HTTP handlers serving stored derivatives back out of the bucket.
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to the configured `ObjectStore`.

use crate::{
    errors::AppError,
    models::object::{ObjectAcl, StoredObject},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose};
use tokio_util::io::ReaderStream;

/// GET `/{bucket}/{*name}`: stream a public object.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    ensure_bucket(&state, &bucket, &name)?;
    let (meta, reader) = state.store.open_reader(&name).await?;
    ensure_public(&meta)?;

    let body = Body::from_stream(ReaderStream::new(reader));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// HEAD `/{bucket}/{*name}`: same headers as GET, no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    ensure_bucket(&state, &bucket, &name)?;
    let meta = state.store.head_object(&name).await?;
    ensure_public(&meta)?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn ensure_bucket(state: &AppState, bucket: &str, name: &str) -> Result<(), AppError> {
    if bucket == state.store.bucket() {
        Ok(())
    } else {
        Err(AppError::not_found(format!(
            "object `{}` not found in bucket `{}`",
            name, bucket
        )))
    }
}

fn ensure_public(meta: &StoredObject) -> Result<(), AppError> {
    match meta.acl() {
        ObjectAcl::PublicRead => Ok(()),
        ObjectAcl::Private => Err(AppError::new(StatusCode::FORBIDDEN, "access denied")),
    }
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size_bytes.max(0)));

    if let Ok(value) = HeaderValue::from_str(&meta.cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }

    if let Some(value) = content_md5(&meta.etag).and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(HeaderName::from_static("content-md5"), value);
    }

    if let Ok(value) = HeaderValue::from_str(&http_date(meta)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// Base64 of the raw digest, as carried in `Content-MD5`.
fn content_md5(hex_etag: &str) -> Option<String> {
    if hex_etag.len() != 32 {
        return None;
    }
    let digest = (0..hex_etag.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex_etag.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    Some(general_purpose::STANDARD.encode(digest))
}

fn http_date(meta: &StoredObject) -> String {
    meta.created_at
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
