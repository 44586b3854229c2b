pub use sweep_core::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Read and parse a TOML config file without validating it.
///
/// Command-line overrides are applied to the result before it is validated,
/// so a file value they replace never has to be valid on its own.
pub fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    Config::from_toml(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Load configuration from a TOML file and validate it as-is
pub fn load_config(path: &Path) -> Result<Config> {
    let config = read_config(path)?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Read config from default locations or return default config.
///
/// The result is not validated; callers validate after applying [`Overrides`].
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return read_config(path);
    }

    let default_paths = ["./vmafsweep.toml", "~/.config/vmafsweep/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return read_config(path);
        }
    }

    Ok(Config::default())
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub concurrency: Option<usize>,
    /// Extra ffmpeg arguments as typed on the command line.
    pub extra_args: Option<String>,
    pub presets: Option<Vec<String>>,
    pub crf_min: Option<u32>,
    pub crf_max: Option<u32>,
    pub max_attempts: Option<u32>,
    pub work_dir: Option<PathBuf>,
    pub keep_encodes: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(n) = self.concurrency {
            config.batch.concurrency = n;
        }
        if let Some(args) = &self.extra_args {
            config.encode.extra_args = split_args(args);
        }
        if let Some(presets) = &self.presets {
            config.grid.presets = presets.clone();
        }
        if let Some(min) = self.crf_min {
            config.grid.quality_min = min;
        }
        if let Some(max) = self.crf_max {
            config.grid.quality_max = max;
        }
        if let Some(attempts) = self.max_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(dir) = &self.work_dir {
            let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
            config.encode.work_dir = Some(PathBuf::from(expanded));
        }
        if self.keep_encodes {
            config.encode.keep_encodes = true;
        }
    }
}

/// Split an argument string on whitespace. Each piece becomes one argv entry;
/// no quoting rules apply.
pub fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}
