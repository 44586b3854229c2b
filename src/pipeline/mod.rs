//! Per-job encode/score pipeline.
//!
//! An [`EncodePipeline`] drives one job through [`PipelineState`]: encode
//! the source with the job's preset and CRF, score the result against the
//! source, and repeat the whole cycle when no score comes back, up to the
//! configured number of attempts. Every path ends in exactly one
//! [`EncodeResult`]; failures are recorded in it rather than returned.

pub mod handlers;
pub mod state;

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use sweep_av::{score_command, transcode_command, EncodeWorkspace, ProcessRunner, SourceInfo};
use sweep_core::config::{Config, ScoreConfig};
use sweep_core::{EncodeResult, Error, FailureReason, JobSpec};

pub use handlers::{JobProgress, ProgressHandler, ScoreHandler};
pub use state::PipelineState;

/// Settings shared by every pipeline of a batch.
#[derive(Debug)]
pub struct PipelineSettings {
    pub ffmpeg: PathBuf,
    pub input: PathBuf,
    pub source_duration: Duration,
    pub extra_args: Vec<String>,
    pub container: String,
    pub keep_encodes: bool,
    pub score: ScoreConfig,
    pub max_attempts: u32,
    /// Per-invocation time limit.
    pub timeout: Option<Duration>,
    pub workspace: EncodeWorkspace,
}

impl PipelineSettings {
    pub fn new(
        config: &Config,
        ffmpeg: PathBuf,
        source: &SourceInfo,
        workspace: EncodeWorkspace,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            ffmpeg,
            input: source.path.clone(),
            source_duration: source.duration,
            extra_args: config.encode.extra_args.clone(),
            container: config.encode.container.clone(),
            keep_encodes: config.encode.keep_encodes,
            score: config.score.clone(),
            max_attempts: config.retry.max_attempts.max(1),
            timeout,
            workspace,
        }
    }
}

/// Drives a single job to a terminal state.
pub struct EncodePipeline {
    job: JobSpec,
    settings: Arc<PipelineSettings>,
    runner: Arc<dyn ProcessRunner>,
    progress: Arc<JobProgress>,
}

impl EncodePipeline {
    pub fn new(
        job: JobSpec,
        settings: Arc<PipelineSettings>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            job,
            settings,
            runner,
            progress: Arc::new(JobProgress::new()),
        }
    }

    pub fn job(&self) -> &JobSpec {
        &self.job
    }

    /// Handle to the encode position of the running attempt.
    pub fn progress(&self) -> Arc<JobProgress> {
        self.progress.clone()
    }

    /// Run the pipeline to completion.
    ///
    /// Never fails: a panic anywhere inside the pipeline is caught here and
    /// becomes [`FailureReason::Internal`].
    pub async fn run(self, cancel: &CancellationToken) -> EncodeResult {
        let job = self.job.clone();
        match AssertUnwindSafe(self.drive(cancel)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("{job}: pipeline panicked: {message}");
                EncodeResult::failed(
                    &job,
                    FailureReason::Internal {
                        message: format!("pipeline panicked: {message}"),
                    },
                    0,
                )
            }
        }
    }

    async fn drive(self, cancel: &CancellationToken) -> EncodeResult {
        let mut state = PipelineState::Pending;
        while !state.is_terminal() {
            state = self.step(state, cancel).await;
            tracing::debug!("{}: {}", self.job, state);
        }

        match state.to_result(&self.job) {
            Some(result) => result,
            None => EncodeResult::failed(
                &self.job,
                FailureReason::Internal {
                    message: format!("pipeline stopped in non-terminal state {state}"),
                },
                state.attempt(),
            ),
        }
    }

    /// Perform the work of `state` and return the state that follows it.
    pub async fn step(&self, state: PipelineState, cancel: &CancellationToken) -> PipelineState {
        match state {
            PipelineState::Pending => PipelineState::Encoding { attempt: 1 },
            PipelineState::Encoding { attempt } => self.encode(attempt, cancel).await,
            PipelineState::Scoring {
                attempt,
                output,
                size_bytes,
                encode_time,
            } => {
                self.score(attempt, output, size_bytes, encode_time, cancel)
                    .await
            }
            terminal => terminal,
        }
    }

    async fn encode(&self, attempt: u32, cancel: &CancellationToken) -> PipelineState {
        if cancel.is_cancelled() {
            return PipelineState::failed(attempt, FailureReason::Cancelled);
        }

        let s = &self.settings;
        let output = s.workspace.output_path(&self.job, &s.container);
        let cmd = transcode_command(
            &s.ffmpeg,
            &s.input,
            &s.extra_args,
            &self.job.preset,
            self.job.quality,
            &output,
            s.timeout,
        );

        tracing::info!(
            "{}: encoding (attempt {attempt}/{})",
            self.job,
            s.max_attempts
        );
        self.progress.reset();
        let mut handler =
            ProgressHandler::new(self.job.to_string(), self.progress.clone(), s.source_duration);

        let outcome = match self.runner.run(&cmd, &mut handler, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard(&output).await;
                return runner_failure(attempt, e, 0);
            }
        };

        if !outcome.success() {
            tracing::error!(
                "{}: encode exited with code {}",
                self.job,
                outcome.exit_code
            );
            self.discard(&output).await;
            return PipelineState::failed(
                attempt,
                FailureReason::Encode {
                    exit_code: outcome.exit_code,
                },
            );
        }

        let size_bytes = match tokio::fs::metadata(&output).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return PipelineState::failed(
                    attempt,
                    FailureReason::Internal {
                        message: format!("encoded output {} unreadable: {e}", output.display()),
                    },
                );
            }
        };

        PipelineState::Scoring {
            attempt,
            output,
            size_bytes,
            encode_time: outcome.processor_time,
        }
    }

    async fn score(
        &self,
        attempt: u32,
        output: PathBuf,
        size_bytes: u64,
        encode_time: Duration,
        cancel: &CancellationToken,
    ) -> PipelineState {
        let s = &self.settings;
        if cancel.is_cancelled() {
            self.discard(&output).await;
            return PipelineState::Failed {
                attempt,
                reason: FailureReason::Cancelled,
                size_bytes,
            };
        }

        let cmd = score_command(&s.ffmpeg, &output, &s.input, &s.score, s.timeout);
        let result = self.runner.run(&cmd, &mut ScoreHandler, cancel).await;
        self.discard(&output).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return runner_failure(attempt, e, size_bytes),
        };

        let score = if outcome.success() {
            handlers::captured_score(&outcome.metrics)
        } else {
            tracing::warn!(
                "{}: scoring exited with code {}",
                self.job,
                outcome.exit_code
            );
            None
        };

        match score {
            Some(vmaf) => {
                tracing::info!(
                    "{}: VMAF {vmaf} (encode {:.2?}, score {:.2?})",
                    self.job,
                    encode_time,
                    outcome.processor_time
                );
                PipelineState::Succeeded {
                    attempt,
                    vmaf,
                    size_bytes,
                    encode_time,
                }
            }
            None if attempt < s.max_attempts => {
                tracing::warn!(
                    "{}: no VMAF score on attempt {attempt}/{}; retrying",
                    self.job,
                    s.max_attempts
                );
                PipelineState::Encoding {
                    attempt: attempt + 1,
                }
            }
            None => {
                tracing::error!("{}: no VMAF score after {attempt} attempts", self.job);
                PipelineState::Failed {
                    attempt,
                    reason: FailureReason::ScoreUnobtainable { attempts: attempt },
                    size_bytes,
                }
            }
        }
    }

    /// Remove an encoded output unless encodes are kept.
    async fn discard(&self, output: &Path) {
        if self.settings.keep_encodes {
            return;
        }
        match tokio::fs::remove_file(output).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {e}", output.display()),
        }
    }
}

fn runner_failure(attempt: u32, err: Error, size_bytes: u64) -> PipelineState {
    let reason = match err {
        Error::Cancelled => FailureReason::Cancelled,
        other => FailureReason::Internal {
            message: other.to_string(),
        },
    };
    PipelineState::Failed {
        attempt,
        reason,
        size_bytes,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
