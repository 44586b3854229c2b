//! Per-job outcomes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::JobSpec;

/// Why a job ended without a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The source could not be probed; the job never started.
    Probe { message: String },
    /// The transcode process exited with a non-zero code.
    Encode { exit_code: i32 },
    /// Every attempt finished without a score line.
    ScoreUnobtainable { attempts: u32 },
    /// The batch was cancelled while the job was pending or running.
    Cancelled,
    /// An unexpected fault inside pipeline orchestration.
    Internal { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Probe { message } => write!(f, "probe failed: {message}"),
            FailureReason::Encode { exit_code } => {
                write!(f, "encode exited with code {exit_code}")
            }
            FailureReason::ScoreUnobtainable { attempts } => {
                write!(f, "no VMAF score after {attempts} attempts")
            }
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

/// Terminal status of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed(FailureReason),
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

/// The outcome of one job, written once when its pipeline terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeResult {
    pub index: usize,
    pub preset: String,
    pub quality: u32,
    /// Perceptual quality score; `None` unless the job succeeded.
    pub vmaf: Option<f64>,
    /// Size of the encoded output in bytes, 0 if it was never produced.
    pub size_bytes: u64,
    /// Time spent by the encode process of the scored attempt.
    pub processor_time: Duration,
    /// Encode+score cycles started for this job.
    pub attempts: u32,
    pub status: JobStatus,
}

impl EncodeResult {
    /// A successful result.
    pub fn succeeded(
        job: &JobSpec,
        vmaf: f64,
        size_bytes: u64,
        processor_time: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            index: job.index,
            preset: job.preset.clone(),
            quality: job.quality,
            vmaf: Some(vmaf),
            size_bytes,
            processor_time,
            attempts,
            status: JobStatus::Succeeded,
        }
    }

    /// A failed result with no measurements.
    pub fn failed(job: &JobSpec, reason: FailureReason, attempts: u32) -> Self {
        Self {
            index: job.index,
            preset: job.preset.clone(),
            quality: job.quality,
            vmaf: None,
            size_bytes: 0,
            processor_time: Duration::ZERO,
            attempts,
            status: JobStatus::Failed(reason),
        }
    }

    /// Keep the size measured by the last encode on a failed result.
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            JobStatus::Succeeded => None,
            JobStatus::Failed(reason) => Some(reason),
        }
    }
}
