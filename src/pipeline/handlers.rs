//! Line handlers attached to the encode and score stages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sweep_av::matchers;
use sweep_av::{LineHandler, Metrics};

/// Metric key under which the score handler stores the VMAF value.
pub const VMAF_METRIC: &str = "vmaf";

/// Minimum time between two progress log lines for the same encode.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Encode position of a running job, shared between its pipeline and anyone
/// who wants to observe it.
///
/// Within one attempt the value only moves forward; it is reset to zero when
/// a new attempt starts.
#[derive(Debug, Default)]
pub struct JobProgress {
    position_ms: AtomicU64,
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current encode position.
    pub fn position(&self) -> Duration {
        Duration::from_millis(self.position_ms.load(Ordering::Relaxed))
    }

    /// Raise the position to `position` if it is ahead of the current value.
    pub fn advance(&self, position: Duration) {
        let ms = u64::try_from(position.as_millis()).unwrap_or(u64::MAX);
        self.position_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.position_ms.store(0, Ordering::Relaxed);
    }

    /// Position as a percentage of `total`, capped at 100.
    pub fn percent_of(&self, total: Duration) -> Option<f64> {
        if total.is_zero() {
            return None;
        }
        let pct = self.position().as_secs_f64() / total.as_secs_f64() * 100.0;
        Some(pct.min(100.0))
    }
}

/// Applies the `time=` matcher to every transcode output line.
pub struct ProgressHandler {
    label: String,
    progress: Arc<JobProgress>,
    source_duration: Duration,
    last_logged: Option<Instant>,
}

impl ProgressHandler {
    pub fn new(label: String, progress: Arc<JobProgress>, source_duration: Duration) -> Self {
        Self {
            label,
            progress,
            source_duration,
            last_logged: None,
        }
    }
}

impl LineHandler for ProgressHandler {
    fn handle(&mut self, line: &str, _metrics: &mut Metrics) -> sweep_core::Result<()> {
        let Some(position) = matchers::progress_time(line) else {
            return Ok(());
        };
        self.progress.advance(position);

        // Throttle to one log line per interval.
        let now = Instant::now();
        if self
            .last_logged
            .is_some_and(|at| now.duration_since(at) < PROGRESS_LOG_INTERVAL)
        {
            return Ok(());
        }
        self.last_logged = Some(now);

        match self.progress.percent_of(self.source_duration) {
            Some(pct) => tracing::debug!("{}: encoded {:.1}%", self.label, pct),
            None => tracing::debug!(
                "{}: encoded {:.1}s",
                self.label,
                self.progress.position().as_secs_f64()
            ),
        }
        Ok(())
    }
}

/// Applies the `VMAF score:` matcher and stores the value under
/// [`VMAF_METRIC`].
#[derive(Debug, Default)]
pub struct ScoreHandler;

impl LineHandler for ScoreHandler {
    fn handle(&mut self, line: &str, metrics: &mut Metrics) -> sweep_core::Result<()> {
        if let Some(score) = matchers::vmaf_score(line) {
            metrics.insert(VMAF_METRIC.to_string(), score.to_string());
        }
        Ok(())
    }
}

/// Read the score captured by [`ScoreHandler`] back out of the metrics.
pub fn captured_score(metrics: &Metrics) -> Option<f64> {
    metrics.get(VMAF_METRIC)?.parse().ok()
}
