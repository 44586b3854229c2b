//! sweep-core: shared types, errors, configuration and the job grid.
//!
//! This crate is the foundational dependency for the other vmafsweep crates,
//! providing the [`JobSpec`] grid generator, the per-job [`EncodeResult`], a
//! unified error type, and the batch configuration.

pub mod config;
pub mod error;
pub mod job;
pub mod result;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use job::{JobGrid, JobSpec};
pub use result::{EncodeResult, FailureReason, JobStatus};
