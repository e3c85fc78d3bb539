use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bucket: String,
    pub cache_max_age: u64,
    pub public_base_url: String,
    pub cors_origin: String,
    pub storage_dir: String,
    pub database_url: String,
    pub max_upload_bytes: usize,
    pub delete_concurrency: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image resize-and-upload service")]
pub struct Args {
    /// Host to bind to (overrides SERVER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides SERVER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket derivatives are written to (overrides BUCKET_ID)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Cache-Control max-age in seconds for stored derivatives (overrides CACHE_MAX_AGE)
    #[arg(long)]
    pub cache_max_age: Option<u64>,

    /// Prefix of returned public URLs (overrides PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Access-Control-Allow-Origin value (overrides CORS)
    #[arg(long)]
    pub cors: Option<String>,

    /// Directory where objects are stored (overrides STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Largest accepted request body in bytes (overrides MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Concurrent backend deletes (overrides DELETE_CONCURRENCY)
    #[arg(long)]
    pub delete_concurrency: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values found through `lookup`, then defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let cfg = Self {
            host: args.host.unwrap_or_else(|| text("SERVER_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => parse_var(&lookup, "SERVER_PORT", 31111)?,
            },
            bucket: args.bucket.unwrap_or_else(|| text("BUCKET_ID", "default")),
            cache_max_age: match args.cache_max_age {
                Some(age) => age,
                None => parse_var(&lookup, "CACHE_MAX_AGE", 86400)?,
            },
            public_base_url: args
                .public_base_url
                .unwrap_or_else(|| text("PUBLIC_BASE_URL", "https://storage.googleapis.com")),
            cors_origin: args.cors.unwrap_or_else(|| text("CORS", "*")),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| text("STORAGE_DIR", "./data/objects")),
            database_url: args
                .database_url
                .unwrap_or_else(|| text("DATABASE_URL", "sqlite://./data/meta/imageup.db")),
            max_upload_bytes: match args.max_upload_bytes {
                Some(limit) => limit,
                None => parse_var(&lookup, "MAX_UPLOAD_BYTES", 32 * 1024 * 1024)?,
            },
            delete_concurrency: match args.delete_concurrency {
                Some(n) => n,
                None => parse_var(&lookup, "DELETE_CONCURRENCY", 8)?,
            },
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = AppConfig::resolve(Args::default(), env_of(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:31111");
        assert_eq!(cfg.bucket, "default");
        assert_eq!(cfg.cache_max_age, 86400);
        assert_eq!(cfg.public_base_url, "https://storage.googleapis.com");
        assert_eq!(cfg.cors_origin, "*");
        assert_eq!(cfg.max_upload_bytes, 32 * 1024 * 1024);
        assert_eq!(cfg.delete_concurrency, 8);
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = AppConfig::resolve(
            Args::default(),
            env_of(&[
                ("SERVER_PORT", "8080"),
                ("BUCKET_ID", "photos"),
                ("CACHE_MAX_AGE", "60"),
                ("CORS", "https://example.com"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.bucket, "photos");
        assert_eq!(cfg.cache_max_age, 60);
        assert_eq!(cfg.cors_origin, "https://example.com");
    }

    #[test]
    fn cli_wins_over_environment() {
        let args = Args {
            port: Some(9000),
            bucket: Some("cli-bucket".into()),
            ..Args::default()
        };
        let cfg = AppConfig::resolve(
            args,
            env_of(&[("SERVER_PORT", "8080"), ("BUCKET_ID", "env-bucket")]),
        )
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.bucket, "cli-bucket");
    }

    #[test]
    fn unparseable_numbers_are_errors() {
        let err = AppConfig::resolve(Args::default(), env_of(&[("CACHE_MAX_AGE", "a day")]))
            .unwrap_err();
        assert!(err.to_string().contains("CACHE_MAX_AGE"), "{err}");
    }
}
