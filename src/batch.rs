//! Batch orchestration: preflight, probe, dispatch, report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use sweep_av::{probe_source, EncodeWorkspace, ProcessRunner, ToolRegistry};
use sweep_core::{EncodeResult, Error, FailureReason};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::pipeline::PipelineSettings;
use crate::report::{ReportWriter, ResultSink};

/// Outcome of a completed batch.
#[derive(Debug)]
pub struct BatchSummary {
    /// One result per job, in generation order.
    pub results: Vec<EncodeResult>,
    /// Where the report was written.
    pub report: PathBuf,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Run every job of `config.grid` against `input` and write the report.
///
/// Configuration problems (invalid settings, missing input or tools, an
/// unwritable report path) abort before any job starts. Everything after
/// that is recorded per job, so the report always has one row per job.
pub async fn run_batch(
    config: &Config,
    input: &Path,
    report: &Path,
    tools: &ToolRegistry,
    runner: Arc<dyn ProcessRunner>,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    config.validate()?;
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    if !input.is_file() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }
    let ffmpeg = tools.require("ffmpeg")?.to_path_buf();
    let ffprobe = tools.require("ffprobe")?.to_path_buf();

    // Creating the writer truncates any previous report.
    let workspace = EncodeWorkspace::open(config.encode.work_dir.as_deref())
        .context("Failed to prepare the encode directory")?;
    let writer = ReportWriter::create(report)?;

    let grid = &config.grid;
    let sink = Arc::new(ResultSink::new(grid.len()));
    tracing::info!(
        "Benchmarking {} jobs ({} presets x {} CRF levels) on {:?}",
        grid.len(),
        grid.presets.len(),
        grid.levels(),
        input
    );

    match probe_source(runner.as_ref(), &ffprobe, input, tools.timeout(), cancel).await {
        Ok(source) => {
            let settings = Arc::new(PipelineSettings::new(
                config,
                ffmpeg,
                &source,
                workspace,
                tools.timeout(),
            ));
            let dispatcher = Dispatcher::new(config.batch.concurrency, settings, runner)?;
            tracing::info!("Dispatching at concurrency {}", dispatcher.concurrency());
            dispatcher.run(grid.iter(), sink.clone(), cancel).await;
        }
        Err(e) => {
            let reason = match e {
                Error::Cancelled => FailureReason::Cancelled,
                other => {
                    tracing::error!("Probe failed, no job will run: {other}");
                    FailureReason::Probe {
                        message: other.to_string(),
                    }
                }
            };
            for job in grid.iter() {
                sink.record(EncodeResult::failed(&job, reason.clone(), 0))?;
            }
        }
    }

    let results = sink.finalize()?;
    let report = writer.write(&results)?;

    let summary = BatchSummary { results, report };
    tracing::info!(
        "Batch complete: {} succeeded, {} failed; report written to {:?}",
        summary.succeeded(),
        summary.failed(),
        summary.report
    );
    Ok(summary)
}
