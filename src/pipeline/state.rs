//! Pipeline states.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use sweep_core::{EncodeResult, FailureReason, JobSpec};

/// Where a pipeline is in its encode/score cycle.
///
/// ```text
/// Pending -> Encoding{1} -> Scoring{1} -> Succeeded
///                 |              |
///                 v              +-> Encoding{2} -> ... (score missing)
///               Failed           +-> Failed (attempts exhausted)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Pending,
    Encoding {
        attempt: u32,
    },
    Scoring {
        attempt: u32,
        output: PathBuf,
        size_bytes: u64,
        encode_time: Duration,
    },
    Succeeded {
        attempt: u32,
        vmaf: f64,
        size_bytes: u64,
        encode_time: Duration,
    },
    Failed {
        attempt: u32,
        reason: FailureReason,
        size_bytes: u64,
    },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded { .. } | PipelineState::Failed { .. }
        )
    }

    /// Encode+score cycles started so far.
    pub fn attempt(&self) -> u32 {
        match self {
            PipelineState::Pending => 0,
            PipelineState::Encoding { attempt }
            | PipelineState::Scoring { attempt, .. }
            | PipelineState::Succeeded { attempt, .. }
            | PipelineState::Failed { attempt, .. } => *attempt,
        }
    }

    /// A failure that happened during `attempt`, keeping no measurements.
    pub fn failed(attempt: u32, reason: FailureReason) -> Self {
        PipelineState::Failed {
            attempt,
            reason,
            size_bytes: 0,
        }
    }

    /// The result for `job` if this state is terminal.
    pub fn to_result(&self, job: &JobSpec) -> Option<EncodeResult> {
        match self {
            PipelineState::Succeeded {
                attempt,
                vmaf,
                size_bytes,
                encode_time,
            } => Some(EncodeResult::succeeded(
                job,
                *vmaf,
                *size_bytes,
                *encode_time,
                *attempt,
            )),
            PipelineState::Failed {
                attempt,
                reason,
                size_bytes,
            } => Some(EncodeResult::failed(job, reason.clone(), *attempt).with_size(*size_bytes)),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Pending => f.write_str("pending"),
            PipelineState::Encoding { attempt } => write!(f, "encoding (attempt {attempt})"),
            PipelineState::Scoring { attempt, .. } => write!(f, "scoring (attempt {attempt})"),
            PipelineState::Succeeded { vmaf, .. } => write!(f, "succeeded (VMAF {vmaf})"),
            PipelineState::Failed { reason, .. } => write!(f, "failed ({reason})"),
        }
    }
}
