//! # sweep-av
//!
//! External tool plumbing for vmafsweep.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- resolve ffmpeg and ffprobe once
//!   per batch.
//! - **Process execution** ([`ProcessRunner`], [`TokioRunner`]) -- run a
//!   [`ToolCommand`], stream its merged output through a [`LineHandler`] and
//!   report a [`ProcessOutcome`] once the process is reaped and drained.
//! - **Line matchers** ([`matchers`]) -- `time=` progress and `VMAF score:`
//!   extraction.
//! - **Probing** ([`probe_source`]) -- source duration via ffprobe.
//! - **Invocations** ([`ffmpeg`]) -- transcode and score argument vectors.
//! - **Workspace** ([`EncodeWorkspace`]) -- where encoded outputs live.

pub mod command;
pub mod ffmpeg;
pub mod lines;
pub mod matchers;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{
    CollectLines, DiscardLines, LineHandler, Metrics, ProcessOutcome, ProcessRunner, TokioRunner,
    ToolCommand,
};
pub use ffmpeg::{score_command, transcode_command};
pub use probe::{probe_source, SourceInfo};
pub use tools::{ToolInfo, ToolRegistry};
pub use workspace::EncodeWorkspace;
