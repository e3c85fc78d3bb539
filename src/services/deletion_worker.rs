//! Deletion Worker: detached, best-effort removal of stored objects.
//!
//! Used both for direct delete requests and for rolling back a failed
//! batch. Every name gets its own task; a failure is logged and never
//! affects the other names or the caller.

use crate::services::storage_writer::StorageWriter;
use std::sync::Arc;
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::{debug, warn};

/// Submits removals to the tokio runtime, bounded by a semaphore.
#[derive(Clone)]
pub struct DeletionWorker {
    writer: StorageWriter,
    permits: Arc<Semaphore>,
}

/// Handles for submitted removals. Dropping it detaches the tasks.
#[derive(Debug, Default)]
pub struct PendingDeletions {
    handles: Vec<JoinHandle<()>>,
}

impl PendingDeletions {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait until every submitted removal has been attempted.
    pub async fn wait(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!("deletion task ended abnormally: {}", err);
            }
        }
    }
}

impl DeletionWorker {
    /// `max_in_flight` caps concurrent backend deletes across the process.
    pub fn new(writer: StorageWriter, max_in_flight: usize) -> Self {
        Self {
            writer,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Queue removal of every name. Returns immediately.
    pub fn submit<I>(&self, names: I) -> PendingDeletions
    where
        I: IntoIterator<Item = String>,
    {
        let handles = names
            .into_iter()
            .map(|name| {
                let writer = self.writer.clone();
                let permits = self.permits.clone();
                tokio::spawn(async move {
                    // The semaphore is never closed.
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    match writer.remove(&name).await {
                        Ok(()) => debug!(object = %name, "removed object"),
                        Err(err) => warn!(
                            object = %name,
                            bucket = %writer.bucket(),
                            "failed to remove object: {}",
                            err
                        ),
                    }
                })
            })
            .collect();

        PendingDeletions { handles }
    }
}
