//! Shared state handed to every axum handler.

use crate::services::{
    deletion_worker::DeletionWorker, pipeline::BatchOrchestrator, storage_service::ObjectStore,
    storage_writer::StorageWriter,
};
use axum::http::HeaderValue;
use std::sync::Arc;

/// Read-only after startup; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: BatchOrchestrator,
    pub store: Arc<dyn ObjectStore>,
    pub cors_origin: HeaderValue,
}

impl AppState {
    /// Wire the pipeline around `store`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        public_base_url: &str,
        cache_max_age: u64,
        delete_concurrency: usize,
        cors_origin: HeaderValue,
    ) -> Self {
        let writer = StorageWriter::new(store.clone(), public_base_url, cache_max_age);
        let deletions = DeletionWorker::new(writer.clone(), delete_concurrency);
        Self {
            pipeline: BatchOrchestrator::new(writer, deletions),
            store,
            cors_origin,
        }
    }
}
