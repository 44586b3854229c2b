//! Bounded dispatcher.
//!
//! Launches one [`EncodePipeline`] per job, in generation order, never
//! letting more than `concurrency` pipelines run at once. A pipeline holds
//! its permit from launch until it has recorded its terminal result, so the
//! bound covers the encode stage, the score stage and every retry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sweep_av::ProcessRunner;
use sweep_core::{EncodeResult, Error, FailureReason, JobSpec, Result};

use crate::pipeline::{EncodePipeline, PipelineSettings};
use crate::report::ResultSink;

pub struct Dispatcher {
    permits: Arc<Semaphore>,
    concurrency: usize,
    settings: Arc<PipelineSettings>,
    runner: Arc<dyn ProcessRunner>,
}

impl Dispatcher {
    pub fn new(
        concurrency: usize,
        settings: Arc<PipelineSettings>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            settings,
            runner,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Pipelines currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }

    /// Run every job and record one result per job into `sink`.
    ///
    /// Returns once every launched pipeline has finished. When `cancel` fires
    /// while waiting for a permit, jobs not yet launched are recorded as
    /// cancelled.
    pub async fn run<I>(&self, jobs: I, sink: Arc<ResultSink>, cancel: &CancellationToken)
    where
        I: IntoIterator<Item = JobSpec>,
    {
        let total = sink.len();
        let finished = Arc::new(AtomicUsize::new(0));
        let mut launched: Vec<(JobSpec, JoinHandle<()>)> = Vec::new();
        let mut jobs = jobs.into_iter();

        while let Some(job) = jobs.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = self.permits.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                let reason = if cancel.is_cancelled() {
                    FailureReason::Cancelled
                } else {
                    FailureReason::Internal {
                        message: "permit pool closed".into(),
                    }
                };
                let skipped = record_unlaunched(&sink, std::iter::once(job).chain(jobs), &reason);
                tracing::warn!("{skipped} jobs not started: {reason}");
                break;
            };

            let pipeline = EncodePipeline::new(job.clone(), self.settings.clone(), self.runner.clone());
            let sink = sink.clone();
            let finished = finished.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let result = pipeline.run(&cancel).await;
                let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                log_finished(done, total, &result);

                let index = result.index;
                if let Err(e) = sink.record(result) {
                    tracing::error!("Dropping result for job {index}: {e}");
                }
                drop(permit);
            });
            launched.push((job, handle));
        }

        for (job, handle) in launched {
            if let Err(e) = handle.await {
                tracing::error!("{job}: pipeline task failed: {e}");
                if !sink.is_recorded(job.index) {
                    let result = EncodeResult::failed(
                        &job,
                        FailureReason::Internal {
                            message: format!("pipeline task failed: {e}"),
                        },
                        0,
                    );
                    if let Err(e) = sink.record(result) {
                        tracing::error!("{job}: {e}");
                    }
                }
            }
        }
    }
}

/// Record `reason` for jobs that never got a permit. Returns how many.
fn record_unlaunched(
    sink: &ResultSink,
    jobs: impl Iterator<Item = JobSpec>,
    reason: &FailureReason,
) -> usize {
    let mut count = 0;
    for job in jobs {
        if let Err(e) = sink.record(EncodeResult::failed(&job, reason.clone(), 0)) {
            tracing::error!("{job}: {e}");
        }
        count += 1;
    }
    count
}

fn log_finished(done: usize, total: usize, result: &EncodeResult) {
    match result.failure() {
        None => tracing::info!(
            "[{done}/{total}] preset={} crf={} -> VMAF {}",
            result.preset,
            result.quality,
            result.vmaf.unwrap_or_default()
        ),
        Some(reason) => tracing::warn!(
            "[{done}/{total}] preset={} crf={} -> {reason}",
            result.preset,
            result.quality
        ),
    }
}
