//! The image derivative pipeline and the storage it writes to.

pub mod deletion_worker;
pub mod identity;
pub mod orientation;
pub mod pipeline;
pub mod storage_service;
pub mod storage_writer;
pub mod transform;

#[cfg(test)]
pub mod test_support;
