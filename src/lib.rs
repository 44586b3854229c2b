//! vmafsweep - encoder preset/CRF quality benchmarking
//!
//! This library crate exposes the core functionality for integration testing.

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod pipeline;
pub mod report;
