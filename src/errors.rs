use crate::services::{pipeline::PipelineError, storage_service::StorageError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "code": self.status.as_u16(),
            "message": self.message,
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::InvalidInput(_) => StatusCode::NOT_ACCEPTABLE,
            PipelineError::DecodeFailure(_) => StatusCode::BAD_REQUEST,
            PipelineError::TransformFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::StorageWriteFailure { .. } => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound { .. } => AppError::not_found(err.to_string()),
            StorageError::InvalidObjectName | StorageError::InvalidBucketName { .. } => {
                AppError::bad_request(err.to_string())
            }
            StorageError::Sqlx(_) | StorageError::Io(_) => AppError::internal(err.to_string()),
        }
    }
}
