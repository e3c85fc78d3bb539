//! The uploaded image a batch is derived from.

use crate::models::format::OutputFormat;
use bytes::Bytes;
use image::ImageReader;
use std::io::Cursor;

/// Uploaded bytes plus the content type the client declared for them.
///
/// The buffer is shared and immutable; each pass over it goes through a
/// fresh cursor that the caller rewinds before reading.
#[derive(Clone, Debug)]
pub struct SourceImage {
    bytes: Bytes,
    content_type: Option<String>,
}

impl SourceImage {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// A seekable reader over the whole upload.
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.bytes.clone())
    }

    /// Pick the encoding for every derivative of this upload.
    ///
    /// The declared content type wins; otherwise the sniffed format if it is
    /// one we encode; otherwise JPEG.
    pub fn negotiate_format(&self) -> OutputFormat {
        self.content_type
            .as_deref()
            .and_then(OutputFormat::from_mime)
            .or_else(|| {
                image::guess_format(&self.bytes)
                    .ok()
                    .and_then(OutputFormat::from_image_format)
            })
            .unwrap_or(OutputFormat::Jpeg)
    }

    /// Read just enough of the header to learn the pixel dimensions.
    pub fn probe_dimensions(&self) -> image::ImageResult<(u32, u32)> {
        ImageReader::new(self.reader())
            .with_guessed_format()?
            .into_dimensions()
    }
}
