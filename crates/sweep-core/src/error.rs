//! Unified error type for vmafsweep.
//!
//! Library code funnels its failures into [`Error`]. Batch-level failures
//! ([`Error::Config`]) abort a run before any job starts; everything else is
//! converted into a per-job [`FailureReason`](crate::FailureReason) by the
//! pipeline that hit it.

/// Unified error type covering all failure modes in vmafsweep.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration or an unusable batch input.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) could not be run to completion.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The source duration could not be determined.
    #[error("Probe error: {0}")]
    Probe(String),

    /// The operation was cancelled before it finished.
    #[error("Cancelled")]
    Cancelled,

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole batch rather than a single job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
