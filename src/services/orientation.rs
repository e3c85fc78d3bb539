//! Orientation Resolver: reads the EXIF orientation tag of an upload.
//!
//! Orientation is always best-effort. Missing, malformed or unsupported
//! metadata collapses to `Orientation::Normal` here and never reaches the
//! caller as an error.

use std::io::{BufRead, Seek, SeekFrom};
use tracing::debug;

/// EXIF orientation codes. Rotations are counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Orientation {
    Normal = 1,
    MirrorHorizontal = 2,
    Rotate180 = 3,
    MirrorHorizontalRotate180 = 4,
    MirrorVerticalRotate270 = 5,
    Rotate270 = 6,
    MirrorVerticalRotate90 = 7,
    Rotate90 = 8,
}

impl Orientation {
    /// Out-of-range codes are treated as identity.
    pub fn from_code(code: u32) -> Self {
        match code {
            2 => Self::MirrorHorizontal,
            3 => Self::Rotate180,
            4 => Self::MirrorHorizontalRotate180,
            5 => Self::MirrorVerticalRotate270,
            6 => Self::Rotate270,
            7 => Self::MirrorVerticalRotate90,
            8 => Self::Rotate90,
            _ => Self::Normal,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Resolve the orientation of the image `reader` is positioned at.
///
/// The reader is put back where it started, so resolving twice on the same
/// stream yields the same answer.
pub fn resolve_orientation<R: BufRead + Seek>(reader: &mut R) -> Orientation {
    let start = match reader.stream_position() {
        Ok(pos) => pos,
        Err(err) => {
            debug!("orientation: stream position unavailable: {}", err);
            return Orientation::Normal;
        }
    };

    let orientation = read_orientation_tag(reader);

    if let Err(err) = reader.seek(SeekFrom::Start(start)) {
        debug!("orientation: failed to restore stream position: {}", err);
    }

    orientation
}

fn read_orientation_tag<R: BufRead + Seek>(reader: &mut R) -> Orientation {
    let exif = match exif::Reader::new().read_from_container(reader) {
        Ok(exif) => exif,
        Err(err) => {
            debug!("orientation: no usable EXIF metadata: {}", err);
            return Orientation::Normal;
        }
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(Orientation::from_code)
        .unwrap_or(Orientation::Normal)
}
