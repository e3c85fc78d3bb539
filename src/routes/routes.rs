//! Defines the HTTP surface of the upload service.
//!
//! ## Structure
//! - **Pipeline endpoints**
//!   - `POST   /`  resize one uploaded image into every requested size
//!   - `DELETE /`  queue removal of previously stored derivatives
//!
//! - **Object endpoints** (public reads of stored derivatives)
//!   - `GET    /{bucket}/{*name}`  download object
//!   - `HEAD   /{bucket}/{*name}`  retrieve metadata only
//!
//! The wildcard `*name` allows nested names like `thumbs/2025/img.jpg`.

use crate::{
    errors::AppError,
    handlers::{
        cors::allow_origin,
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object},
        upload_handlers::{delete_files, upload_image},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    routing::{get, post},
};

/// Build the router with its state attached.
///
/// `max_upload_bytes` caps request bodies, multipart uploads included.
pub fn routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", post(upload_image).delete(delete_files))
        .route("/{bucket}/{*name}", get(get_object).head(head_object))
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), allow_origin))
        .with_state(state)
}

/// Keeps 405s in the same JSON envelope as every other error.
async fn method_not_allowed() -> AppError {
    AppError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}
