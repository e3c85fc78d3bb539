//! HTTP handlers for the upload endpoint: `POST /` stores derivatives of
//! one image, `DELETE /` queues removal of previously stored ones.

use crate::{
    errors::AppError,
    models::{derivative::Derivative, source::SourceImage, spec::OutputSpec},
    state::AppState,
};
use axum::{
    Form, Json,
    extract::{FromRequest, Multipart, Query, Request, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// `files` may arrive in the query string or in a form body.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteFilesQuery {
    pub files: Option<String>,
}

/// `POST /`: multipart with a `file` part and a `sizes` JSON array.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<Derivative>>), AppError> {
    let mut source: Option<SourceImage> = None;
    let mut sizes: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                source = Some(SourceImage::new(bytes, content_type));
            }
            Some("sizes") => {
                sizes = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let Some(source) = source else {
        warn!("upload without a file part");
        return Err(AppError::bad_request("problem finding the file"));
    };

    let specs = sizes
        .as_deref()
        .map(OutputSpec::parse_list)
        .transpose()
        .map_err(|err| {
            warn!("rejecting size configuration {:?}: {}", sizes, err);
            AppError::new(
                StatusCode::NOT_ACCEPTABLE,
                "there is a problem with the size configuration",
            )
        })?
        .unwrap_or_default();

    let derivatives = state.pipeline.process_batch(source, specs).await?;
    Ok((StatusCode::CREATED, Json(derivatives)))
}

/// `DELETE /?files=a.jpg,b.jpg` responds before any removal happens.
pub async fn delete_files(
    State(state): State<AppState>,
    Query(query): Query<DeleteFilesQuery>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let raw = match query.files {
        Some(files) => Some(files),
        None => files_from_body(request, &state).await?,
    };

    let names = parse_file_list(raw.as_deref().unwrap_or_default());
    if names.is_empty() {
        return Err(AppError::bad_request("no files were given to remove"));
    }

    // Detached: removal outcomes only reach the log.
    drop(state.pipeline.delete_objects(names));

    Ok((
        StatusCode::OK,
        Json(json!({
            "code": StatusCode::OK.as_u16(),
            "message": "file(s) queued to be removed",
        })),
    ))
}

async fn files_from_body(request: Request, state: &AppState) -> Result<Option<String>, AppError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rej| AppError::new(rej.status(), rej.body_text()))?;
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() == Some("files") {
                return Ok(Some(field.text().await.map_err(multipart_error)?));
            }
        }
        Ok(None)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<DeleteFilesQuery>::from_request(request, state)
            .await
            .map_err(|rej| AppError::new(rej.status(), rej.body_text()))?;
        Ok(form.files)
    } else {
        Ok(None)
    }
}

/// Comma-separated names, trimmed, empties dropped.
pub fn parse_file_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}
