//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness as reported by the configured object store

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Always 200 OK. Performs no I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs every probe the backend exposes (for the disk store: `SELECT 1`
/// against SQLite and a write/read/delete under the storage directory).
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let results = state.store.readiness().await;
    let overall_ok = results.iter().all(|check| check.ok);

    let checks = results
        .into_iter()
        .map(|check| {
            (
                check.name,
                CheckStatus {
                    ok: check.ok,
                    error: check.error,
                },
            )
        })
        .collect();

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
