//! External tool detection.
//!
//! The [`ToolRegistry`] resolves the locations of ffmpeg and ffprobe once at
//! batch startup. The resolved paths are immutable for the rest of the run
//! and injected into every invocation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sweep_core::config::ToolsConfig;
use sweep_core::{Error, Result};

/// Known tool names that the registry manages.
pub const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
    /// Whether ffmpeg was built with the libvmaf filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libvmaf: Option<bool>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// A configured path is used when it exists; otherwise [`which::which`]
    /// locates the tool in `PATH`. Tools that are not found are omitted.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => config.ffmpeg_path.as_deref(),
                "ffprobe" => config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured {name} path {} does not exist; searching PATH",
                        p.display()
                    );
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!("Resolved {name} to {}", path.display());
                    tools.insert(name.to_string(), path);
                }
                None => tracing::debug!("{name} not found"),
            }
        }

        Self {
            tools,
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Build a registry from explicit paths, bypassing discovery.
    pub fn from_paths(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        let tools = HashMap::from([
            ("ffmpeg".to_string(), ffmpeg),
            ("ffprobe".to_string(), ffprobe),
        ]);
        Self {
            tools,
            timeout: None,
        }
    }

    /// Per-invocation time limit applied to every tool.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Return the resolved path of the given tool, or an [`Error::Tool`] if it
    /// was not found during discovery.
    pub fn require(&self, name: &str) -> Result<&Path> {
        self.tools
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::tool(name, format!("{name} not found; is it installed and in PATH?")))
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                    libvmaf: (name == "ffmpeg").then(|| has_libvmaf(path)),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                    libvmaf: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

/// Whether `ffmpeg -filters` lists libvmaf.
fn has_libvmaf(path: &Path) -> bool {
    std::process::Command::new(path)
        .args(["-hide_banner", "-filters"])
        .output()
        .map(|output| {
            String::from_utf8_lossy(&output.stdout)
                .split_whitespace()
                .any(|word| word == "libvmaf")
        })
        .unwrap_or(false)
}
