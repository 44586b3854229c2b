//! Source duration probing with ffprobe.
//!
//! Runs `ffprobe -v quiet -print_format json -show_format <input>` through a
//! [`ProcessRunner`] and reads `format.duration` from the JSON document. Any
//! other shape is a probe failure: the source is unusable and no job should
//! be started against it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use sweep_core::{Error, Result};

use crate::command::{CollectLines, ProcessRunner, ToolCommand};

/// What the batch needs to know about its input.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub duration: Duration,
}

/// Probe `input` with the ffprobe at `ffprobe`.
pub async fn probe_source(
    runner: &dyn ProcessRunner,
    ffprobe: &Path,
    input: &Path,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<SourceInfo> {
    let mut cmd = ToolCommand::new(ffprobe.to_path_buf());
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .path_arg(input)
        .timeout(timeout);

    let mut output = CollectLines::default();
    let outcome = runner.run(&cmd, &mut output, cancel).await?;
    if !outcome.success() {
        return Err(Error::Probe(format!(
            "ffprobe exited with code {} for {}",
            outcome.exit_code,
            input.display()
        )));
    }

    let duration = parse_duration(&output.joined())?;
    tracing::info!("Probed {}: duration {:.3}s", input.display(), duration.as_secs_f64());

    Ok(SourceInfo {
        path: input.to_path_buf(),
        duration,
    })
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Read `format.duration` from ffprobe's JSON output.
pub fn parse_duration(json: &str) -> Result<Duration> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let raw = output
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| Error::Probe("format.duration missing from ffprobe output".into()))?;

    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::Probe(format!("format.duration is not a number: {raw:?}")))?;

    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::Probe(format!("format.duration is out of range: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFPROBE_OUTPUT: &str = r#"{
        "format": {
            "filename": "/media/input.mkv",
            "nb_streams": 2,
            "format_name": "matroska,webm",
            "start_time": "0.000000",
            "duration": "83.450000",
            "size": "52428800",
            "bit_rate": "5026000"
        }
    }"#;

    #[test]
    fn duration_is_read_from_format() {
        let duration = parse_duration(FFPROBE_OUTPUT).unwrap();
        assert_eq!(duration, Duration::from_millis(83_450));
    }

    #[test]
    fn missing_duration_is_probe_error() {
        let err = parse_duration(r#"{"format": {"format_name": "image2"}}"#).unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn missing_format_is_probe_error() {
        assert!(matches!(parse_duration("{}"), Err(Error::Probe(_))));
    }

    #[test]
    fn non_numeric_duration_is_probe_error() {
        let err = parse_duration(r#"{"format": {"duration": "N/A"}}"#).unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn negative_duration_is_probe_error() {
        assert!(parse_duration(r#"{"format": {"duration": "-1.0"}}"#).is_err());
    }

    #[test]
    fn empty_output_is_probe_error() {
        assert!(matches!(parse_duration(""), Err(Error::Probe(_))));
    }
}
