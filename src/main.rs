use anyhow::{Context, Result};
use axum::http::HeaderValue;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::storage_service::{DiskStore, run_migrations};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting imageup with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // SQLite creates the file but not its parent directory.
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let connect_url = if db_url.contains('?') || db_path == ":memory:" {
        db_url.clone()
    } else {
        format!("{}?mode=rwc", db_url)
    };
    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&connect_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );

    run_migrations(&db).await.context("running migrations")?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let store = Arc::new(DiskStore::new(
        db.clone(),
        cfg.storage_dir.clone(),
        cfg.bucket.clone(),
    )?);
    let cors_origin = HeaderValue::from_str(&cfg.cors_origin)
        .with_context(|| format!("invalid CORS origin `{}`", cfg.cors_origin))?;
    let app_state = state::AppState::new(
        store,
        &cfg.public_base_url,
        cfg.cache_max_age,
        cfg.delete_concurrency,
        cors_origin,
    );

    // --- Build router ---
    let app = routes::routes::routes(app_state, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        bucket = %cfg.bucket,
        "Server listening on http://{}",
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;

    Ok(())
}
