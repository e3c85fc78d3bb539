//! One requested derivative of an uploaded image.

use serde::{Deserialize, Serialize};

/// A caller-supplied output specification.
///
/// The wire names (`name`, `fill`) are the ones existing upload clients
/// already send in the `sizes` form field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OutputSpec {
    /// Free-form label echoed back on the resulting derivative.
    #[serde(rename = "name", default)]
    pub label: String,

    /// Target width in pixels.
    pub width: u32,

    /// Target height in pixels.
    pub height: u32,

    /// `true` crops to exactly `width × height`; `false` fits inside it.
    #[serde(rename = "fill", default)]
    pub fill_mode: bool,
}

impl OutputSpec {
    pub fn new(label: impl Into<String>, width: u32, height: u32, fill_mode: bool) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            fill_mode,
        }
    }

    /// Parse the JSON array sent in the `sizes` form field.
    pub fn parse_list(raw: &str) -> Result<Vec<OutputSpec>, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
