//! Data types shared by the derivative pipeline, the object store and the
//! HTTP layer.
//!
//! Request-side types (`OutputSpec`, `SourceImage`) are immutable once
//! built; result-side types (`Derivative`, `StoredObject`) are only created
//! after a successful storage write.

pub mod derivative;
pub mod format;
pub mod object;
pub mod source;
pub mod spec;
