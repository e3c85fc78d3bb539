//! Batch Orchestrator: turns one upload and a list of output specs into
//! stored derivatives, all or nothing.
//!
//! A batch is either returned complete, in the caller's spec order, or it
//! fails and every derivative already written for it is queued for removal
//! before the error is returned.

use crate::{
    models::{
        derivative::Derivative, format::OutputFormat, source::SourceImage, spec::OutputSpec,
    },
    services::{
        deletion_worker::{DeletionWorker, PendingDeletions},
        identity,
        orientation::resolve_orientation,
        storage_service::StorageError,
        storage_writer::StorageWriter,
        transform::{self, TransformError},
    },
};
use bytes::Bytes;
use std::io::{Seek, SeekFrom};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("source is not a supported image: {0}")]
    DecodeFailure(String),
    #[error("transform failed for `{label}`: {source}")]
    TransformFailure {
        label: String,
        #[source]
        source: TransformError,
    },
    #[error("write of `{name}` failed: {source}")]
    StorageWriteFailure {
        name: String,
        #[source]
        source: StorageError,
    },
}

/// Drives derivative generation for one upload at a time.
///
/// Holds only the injected storage handle and deletion worker, so one
/// instance serves every concurrent request.
#[derive(Clone)]
pub struct BatchOrchestrator {
    writer: StorageWriter,
    deletions: DeletionWorker,
}

impl BatchOrchestrator {
    pub fn new(writer: StorageWriter, deletions: DeletionWorker) -> Self {
        Self { writer, deletions }
    }

    /// Produce one stored derivative per spec, or none at all.
    ///
    /// The batch runs on its own task, so dropping the returned future (a
    /// client hanging up mid-upload) neither stops it nor skips rollback.
    pub async fn process_batch(
        &self,
        source: SourceImage,
        specs: Vec<OutputSpec>,
    ) -> Result<Vec<Derivative>, PipelineError> {
        let orchestrator = self.clone();
        let batch = tokio::spawn(async move { orchestrator.run_batch(source, specs).await });

        match batch.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(PipelineError::TransformFailure {
                label: "batch".into(),
                source: TransformError::Aborted(err.to_string()),
            }),
        }
    }

    async fn run_batch(
        &self,
        source: SourceImage,
        specs: Vec<OutputSpec>,
    ) -> Result<Vec<Derivative>, PipelineError> {
        if specs.is_empty() {
            return Err(PipelineError::InvalidInput(
                "there were no size instructions sent with request".into(),
            ));
        }

        let (src_w, src_h) = source
            .probe_dimensions()
            .map_err(|err| PipelineError::DecodeFailure(err.to_string()))?;
        let format = source.negotiate_format();

        info!(
            specs = specs.len(),
            source_bytes = source.len(),
            content_type = source.content_type().unwrap_or("unknown"),
            source_width = src_w,
            source_height = src_h,
            format = ?format,
            "processing batch"
        );

        let mut written: Vec<Derivative> = Vec::with_capacity(specs.len());
        for spec in &specs {
            match self.process_one(&source, spec, format).await {
                Ok(derivative) => written.push(derivative),
                Err(err) => {
                    let pending = self.roll_back(&written);
                    warn!(
                        error = %err,
                        rolled_back = pending.len(),
                        "batch failed; removing derivatives already written"
                    );
                    return Err(err);
                }
            }
        }

        info!(derivatives = written.len(), "batch stored");
        Ok(written)
    }

    /// Queue removal of caller-named objects. Never waits, never fails.
    pub fn delete_objects<I>(&self, names: I) -> PendingDeletions
    where
        I: IntoIterator<Item = String>,
    {
        let pending = self.deletions.submit(names);
        info!(objects = pending.len(), "file(s) queued to be removed");
        pending
    }

    fn roll_back(&self, written: &[Derivative]) -> PendingDeletions {
        self.deletions
            .submit(written.iter().map(|d| d.object_name.clone()))
    }

    async fn process_one(
        &self,
        source: &SourceImage,
        spec: &OutputSpec,
        format: OutputFormat,
    ) -> Result<Derivative, PipelineError> {
        debug!(
            label = %spec.label,
            width = spec.width,
            height = spec.height,
            fill = spec.fill_mode,
            "processing derivative"
        );

        let encoded = render(source.clone(), spec.clone(), format).await?;

        let name = identity::object_name(format);
        let url = self
            .writer
            .write(&name, encoded, format.mime_type())
            .await
            .map_err(|source| PipelineError::StorageWriteFailure {
                name: name.clone(),
                source,
            })?;

        Ok(Derivative::from_spec(spec, name, url))
    }
}

/// Orient, resize and encode one derivative on the blocking pool.
async fn render(
    source: SourceImage,
    spec: OutputSpec,
    format: OutputFormat,
) -> Result<Bytes, PipelineError> {
    let label = spec.label.clone();
    let transform_failure = |source: TransformError| PipelineError::TransformFailure {
        label: label.clone(),
        source,
    };

    let result = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, TransformError> {
        let mut reader = source.reader();

        rewind(&mut reader)?;
        let orientation = resolve_orientation(&mut reader);
        debug!(orientation = orientation.code(), "resolved orientation");

        rewind(&mut reader)?;
        let img = transform::decode(reader)?;

        let resized = transform::transform(img, orientation, &spec)?;
        transform::encode(&resized, format)
    })
    .await;

    match result {
        Ok(Ok(bytes)) => Ok(Bytes::from(bytes)),
        Ok(Err(TransformError::Decode(err))) => Err(PipelineError::DecodeFailure(err.to_string())),
        Ok(Err(err)) => Err(transform_failure(err)),
        Err(join_err) => Err(transform_failure(TransformError::Aborted(join_err.to_string()))),
    }
}

fn rewind<S: Seek>(reader: &mut S) -> Result<(), TransformError> {
    reader
        .seek(SeekFrom::Start(0))
        .map(|_| ())
        .map_err(|err| TransformError::Decode(image::ImageError::IoError(err)))
}
