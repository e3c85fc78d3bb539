//! Identity Generator: object names for stored derivatives.

use crate::models::format::OutputFormat;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Second-resolution, lexicographically sortable timestamp prefix.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// `<timestamp>-<uuid>.<ext>` for the current instant.
pub fn object_name(format: OutputFormat) -> String {
    object_name_at(Utc::now(), format)
}

pub fn object_name_at(now: DateTime<Utc>, format: OutputFormat) -> String {
    format!(
        "{}-{}.{}",
        now.format(TIMESTAMP_FORMAT),
        Uuid::new_v4(),
        format.extension()
    )
}
