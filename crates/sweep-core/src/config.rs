//! Batch configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML. Every section defaults
//! sensibly so an empty file is valid and describes the standard 520-job grid
//! at concurrency 1.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::job::JobGrid;
use crate::Error;

/// Highest CRF any supported encoder accepts (10-bit x264 / x265).
const MAX_QUALITY: u32 = 63;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for a benchmark batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub grid: JobGrid,
    pub encode: EncodeConfig,
    pub score: ScoreConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::config(format!("config parse error: {e}")))
    }

    /// Check for settings that make a batch impossible to run.
    ///
    /// These are hard errors: a batch must not start with any of them.
    pub fn validate(&self) -> Result<()> {
        if self.batch.concurrency == 0 {
            return Err(Error::config("batch.concurrency must be at least 1"));
        }

        if self.grid.presets.is_empty() {
            return Err(Error::config("grid.presets must not be empty"));
        }

        if let Some(empty) = self.grid.presets.iter().position(|p| p.trim().is_empty()) {
            return Err(Error::config(format!("grid.presets[{empty}] is blank")));
        }

        for (i, preset) in self.grid.presets.iter().enumerate() {
            if preset.contains(['/', '\\', '\0']) || preset == "." || preset == ".." {
                return Err(Error::config(format!(
                    "grid.presets[{i}] ({preset:?}) is not a valid preset name"
                )));
            }
            if self.grid.presets[..i].contains(preset) {
                return Err(Error::config(format!(
                    "grid.presets[{i}] ({preset:?}) is listed more than once"
                )));
            }
        }

        if self.grid.quality_min > self.grid.quality_max {
            return Err(Error::config(format!(
                "grid.crf_min ({}) is greater than grid.crf_max ({})",
                self.grid.quality_min, self.grid.quality_max
            )));
        }

        if self.grid.quality_max > MAX_QUALITY {
            return Err(Error::config(format!(
                "grid.crf_max ({}) exceeds {MAX_QUALITY}",
                self.grid.quality_max
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }

        if self.encode.container.trim().is_empty() {
            return Err(Error::config("encode.container must not be empty"));
        }

        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for flag in ["-preset", "-crf"] {
            if self.encode.extra_args.iter().any(|a| a == flag) {
                warnings.push(format!(
                    "encode.extra_args contains {flag}; it is injected per job and will be overridden"
                ));
            }
        }

        if self.batch.concurrency > 1 && self.score.threads.is_none() {
            warnings.push(
                "score.threads is unset; concurrent libvmaf runs may oversubscribe the CPU".into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Kill any single tool invocation running longer than this.
    pub timeout_secs: Option<u64>,
}

/// Transcode settings shared by every job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Arguments forwarded verbatim to ffmpeg, before `-preset` and `-crf`.
    pub extra_args: Vec<String>,
    /// Extension of the encoded outputs.
    #[serde(default = "default_container")]
    pub container: String,
    /// Keep encoded outputs after they are scored.
    pub keep_encodes: bool,
    /// Directory for encoded outputs; a temporary directory when unset.
    pub work_dir: Option<PathBuf>,
}

fn default_container() -> String {
    "mkv".into()
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            extra_args: vec!["-c:v".into(), "libx264".into(), "-an".into()],
            container: default_container(),
            keep_encodes: false,
            work_dir: None,
        }
    }
}

/// libvmaf filter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// libvmaf model specification, e.g. `version=vmaf_v0.6.1`.
    pub model: Option<String>,
    /// libvmaf worker threads per scoring run.
    pub threads: Option<u32>,
}

/// Retry policy for the score stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Full encode+score cycles allowed per job.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

/// Batch scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pipelines allowed in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}
