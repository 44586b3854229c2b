//! Shared test harness for integration tests.
//!
//! Provides [`ScriptedRunner`], a [`ProcessRunner`] that answers probe,
//! encode and score invocations from a script instead of spawning ffmpeg,
//! and records every call plus how many jobs were in flight at once.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sweep_av::{
    EncodeWorkspace, LineHandler, Metrics, ProcessOutcome, ProcessRunner, SourceInfo, ToolCommand,
    ToolRegistry,
};
use sweep_core::config::Config;
use sweep_core::{Error, JobGrid, Result};
use vmafsweep::pipeline::PipelineSettings;

pub const SCORE: f64 = 93.5;
pub const ENCODED_SIZE: usize = 1024;

const PROBE_JSON: &str = r#"{"format": {"filename": "source.mkv", "duration": "60.000000"}}"#;

/// One invocation seen by the runner. Jobs are keyed `<preset>_<crf>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe,
    Encode(String),
    Score(String),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    scores_withheld: HashMap<String, u32>,
    active: HashSet<String>,
    max_active: usize,
}

pub struct ScriptedRunner {
    delay: Duration,
    max_attempts: u32,
    probe_output: String,
    slow_jobs: HashMap<String, Duration>,
    encode_exit: HashMap<String, i32>,
    missing_scores: HashMap<String, u32>,
    panic_on_encode: HashSet<String>,
    state: Mutex<State>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(5),
            max_attempts: 5,
            probe_output: PROBE_JSON.to_string(),
            slow_jobs: HashMap::new(),
            encode_exit: HashMap::new(),
            missing_scores: HashMap::new(),
            panic_on_encode: HashSet::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Time each encode and score invocation takes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The pipelines' attempt budget, so the runner knows when a job is done.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_probe_output(mut self, output: &str) -> Self {
        self.probe_output = output.to_string();
        self
    }

    pub fn slow(mut self, key: &str, delay: Duration) -> Self {
        self.slow_jobs.insert(key.to_string(), delay);
        self
    }

    pub fn fail_encode(mut self, key: &str, exit_code: i32) -> Self {
        self.encode_exit.insert(key.to_string(), exit_code);
        self
    }

    /// Withhold the score line from the first `times` score runs of a job.
    pub fn miss_scores(mut self, key: &str, times: u32) -> Self {
        self.missing_scores.insert(key.to_string(), times);
        self
    }

    pub fn panic_on_encode(mut self, key: &str) -> Self {
        self.panic_on_encode.insert(key.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Most jobs observed between their first encode and their terminal
    /// stage at the same time.
    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    fn begin(&self, call: Call) {
        let mut state = self.state.lock().unwrap();
        if let Call::Encode(key) = &call {
            state.active.insert(key.clone());
            state.max_active = state.max_active.max(state.active.len());
        }
        state.calls.push(call);
    }

    fn finish_job(&self, key: &str) {
        self.state.lock().unwrap().active.remove(key);
    }

    async fn work(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        let delay = self.slow_jobs.get(key).copied().unwrap_or(self.delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => {
                self.finish_job(key);
                Err(Error::Cancelled)
            }
        }
    }

    fn outcome(&self, exit_code: i32, metrics: Metrics) -> ProcessOutcome {
        ProcessOutcome {
            exit_code,
            processor_time: self.delay,
            metrics,
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        cmd: &ToolCommand,
        handler: &mut dyn LineHandler,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome> {
        let argv = cmd.argv();
        let mut metrics = Metrics::new();

        if cmd.program_name() == "ffprobe" {
            self.begin(Call::Probe);
            for line in self.probe_output.lines() {
                let _ = handler.handle(line, &mut metrics);
            }
            return Ok(self.outcome(0, metrics));
        }

        if argv.iter().any(|a| a == "-crf") {
            let output = PathBuf::from(argv.last().cloned().unwrap_or_default());
            let key = job_key(&output);
            self.begin(Call::Encode(key.clone()));
            if self.panic_on_encode.contains(&key) {
                self.finish_job(&key);
                panic!("scripted panic for {key}");
            }

            let _ = handler.handle("frame=1 fps=0.0 q=0.0 size=0kB time=N/A bitrate=N/A", &mut metrics);
            self.work(&key, cancel).await?;
            let _ = handler.handle("frame=30 fps=30 q=28 size=1kB time=00:00:01.00 bitrate=8kbits/s", &mut metrics);

            if let Some(&code) = self.encode_exit.get(&key) {
                self.finish_job(&key);
                return Ok(self.outcome(code, metrics));
            }
            std::fs::write(&output, vec![0u8; ENCODED_SIZE]).map_err(Error::from)?;
            return Ok(self.outcome(0, metrics));
        }

        if argv.iter().any(|a| a == "-lavfi") {
            let distorted = argv
                .iter()
                .position(|a| a == "-i")
                .and_then(|i| argv.get(i + 1))
                .cloned()
                .unwrap_or_default();
            let key = job_key(Path::new(&distorted));
            self.begin(Call::Score(key.clone()));
            self.work(&key, cancel).await?;

            let withhold = {
                let mut state = self.state.lock().unwrap();
                let withheld = state.scores_withheld.entry(key.clone()).or_insert(0);
                let wanted = self.missing_scores.get(&key).copied().unwrap_or(0);
                if *withheld < wanted {
                    *withheld += 1;
                    Some(*withheld)
                } else {
                    None
                }
            };

            match withhold {
                Some(n) => {
                    if n >= self.max_attempts {
                        self.finish_job(&key);
                    }
                }
                None => {
                    let _ = handler.handle(&format!("[libvmaf @ 0x0] VMAF score: {SCORE} e=N/A"), &mut metrics);
                    self.finish_job(&key);
                }
            }
            return Ok(self.outcome(0, metrics));
        }

        Err(Error::tool(cmd.program_name(), "unexpected invocation"))
    }
}

/// `<index>_<preset>_<crf>.<ext>` becomes `<preset>_<crf>`.
fn job_key(output: &Path) -> String {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match stem.split_once('_') {
        Some((_, key)) => key.to_string(),
        None => stem,
    }
}

/// A config for a small grid.
pub fn config(presets: &[&str], crf_min: u32, crf_max: u32, concurrency: usize) -> Config {
    let mut config = Config::default();
    config.grid = JobGrid::new(
        presets.iter().map(|p| p.to_string()).collect(),
        crf_min,
        crf_max,
    );
    config.batch.concurrency = concurrency;
    config
}

pub fn fake_tools() -> ToolRegistry {
    ToolRegistry::from_paths(PathBuf::from("/fake/ffmpeg"), PathBuf::from("/fake/ffprobe"))
}

/// Pipeline settings writing into `workspace`, for a 60 second source.
pub fn settings(config: &Config, workspace: EncodeWorkspace) -> Arc<PipelineSettings> {
    let source = SourceInfo {
        path: PathBuf::from("/media/source.mkv"),
        duration: Duration::from_secs(60),
    };
    Arc::new(PipelineSettings::new(
        config,
        PathBuf::from("/fake/ffmpeg"),
        &source,
        workspace,
        None,
    ))
}
