//! Directory holding the encoded outputs of a batch.
//!
//! An [`EncodeWorkspace`] is either a temporary directory that disappears
//! with the workspace, or a caller-chosen directory that is created if needed
//! and left in place.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use sweep_core::{Error, JobSpec, Result};

#[derive(Debug)]
enum Root {
    Temp(TempDir),
    Kept(PathBuf),
}

/// Workspace for per-job encoded outputs.
///
/// # Example
///
/// ```no_run
/// use sweep_av::EncodeWorkspace;
/// use sweep_core::JobSpec;
///
/// let workspace = EncodeWorkspace::temporary().unwrap();
/// let job = JobSpec::new(0, "slow", 23);
/// assert!(workspace.output_path(&job, "mkv").ends_with("0_slow_23.mkv"));
/// ```
#[derive(Debug)]
pub struct EncodeWorkspace {
    root: Root,
}

impl EncodeWorkspace {
    /// Create a workspace backed by a fresh temporary directory.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("vmafsweep-")
            .tempdir()
            .map_err(|e| Error::tool("workspace", format!("failed to create temp dir: {e}")))?;
        Ok(Self {
            root: Root::Temp(dir),
        })
    }

    /// Use `dir` as the workspace, creating it when it does not exist.
    pub fn at(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::tool(
                "workspace",
                format!("failed to create {}: {e}", dir.display()),
            )
        })?;
        Ok(Self {
            root: Root::Kept(dir.to_path_buf()),
        })
    }

    /// Use `dir` when given, otherwise a temporary directory.
    pub fn open(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::at(dir),
            None => Self::temporary(),
        }
    }

    /// Path to the workspace directory.
    pub fn dir(&self) -> &Path {
        match &self.root {
            Root::Temp(dir) => dir.path(),
            Root::Kept(dir) => dir,
        }
    }

    /// Whether the directory is removed when the workspace is dropped.
    pub fn is_temporary(&self) -> bool {
        matches!(self.root, Root::Temp(_))
    }

    /// Output path for a job: `<dir>/<index>_<preset>_<quality>.<extension>`.
    ///
    /// The index keeps paths distinct even when a preset appears twice in the
    /// grid.
    pub fn output_path(&self, job: &JobSpec, extension: &str) -> PathBuf {
        let extension = extension.trim_start_matches('.');
        self.dir().join(format!(
            "{}_{}_{}.{extension}",
            job.index, job.preset, job.quality
        ))
    }
}
