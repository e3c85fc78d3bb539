//! A stored, resized copy of an uploaded image.

use crate::models::spec::OutputSpec;
use serde::{Deserialize, Serialize};

/// Result of processing one `OutputSpec` against one source image.
///
/// Only constructed after the storage write succeeded. Width and height
/// echo the requested spec, not the encoded pixel size.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Derivative {
    /// Generated object name within the configured bucket.
    #[serde(rename = "fileName")]
    pub object_name: String,

    /// Label copied from the originating spec.
    #[serde(rename = "name")]
    pub label: String,

    pub width: u32,
    pub height: u32,
    pub fill: bool,

    /// Public URL the object is reachable under.
    #[serde(rename = "url")]
    pub public_url: String,
}

impl Derivative {
    pub fn from_spec(spec: &OutputSpec, object_name: String, public_url: String) -> Self {
        Self {
            object_name,
            label: spec.label.clone(),
            width: spec.width,
            height: spec.height,
            fill: spec.fill_mode,
            public_url,
        }
    }
}
