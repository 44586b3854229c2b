//! Result collection and the CSV report.
//!
//! The [`ResultSink`] has one write-once slot per job, indexed by generation
//! order, so pipelines finishing in any order still produce an ordered
//! report. [`ReportWriter`] opens the report file before the batch starts and
//! writes the rendered CSV once every slot is filled.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use sweep_core::{EncodeResult, Error, JobStatus, Result};

/// Header row of the report.
pub const CSV_HEADER: &str = "Order,Preset,CRF,VMAF,Size,Processor Time";

/// Placeholder in the VMAF column for jobs without a score.
pub const FAILED_MARKER: &str = "FAILED";

/// Write-once result table.
#[derive(Debug)]
pub struct ResultSink {
    slots: Vec<OnceLock<EncodeResult>>,
}

impl ResultSink {
    /// Allocate `len` empty slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store `result` in the slot at `result.index`.
    ///
    /// A slot is written once. A second write for the same index, or an
    /// index outside the table, is rejected and leaves the table unchanged.
    pub fn record(&self, result: EncodeResult) -> Result<()> {
        let index = result.index;
        let slot = self.slots.get(index).ok_or_else(|| {
            Error::Internal(format!(
                "result index {index} out of range for {} jobs",
                self.slots.len()
            ))
        })?;

        slot.set(result)
            .map_err(|_| Error::Internal(format!("result for job {index} already recorded")))
    }

    pub fn is_recorded(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|slot| slot.get().is_some())
    }

    /// Number of slots written so far.
    pub fn recorded(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// All results in generation order. Fails if any slot is still empty.
    pub fn finalize(&self) -> Result<Vec<EncodeResult>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.get()
                    .cloned()
                    .ok_or_else(|| Error::Internal(format!("no result recorded for job {index}")))
            })
            .collect()
    }
}

/// Format a duration as `HH:MM:SS[.fffffff]`.
///
/// The fraction has at most seven digits, drops trailing zeros and is omitted
/// entirely for whole seconds.
pub fn format_processor_time(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs / 60) % 60, secs % 60);
    let mut out = format!("{hours:02}:{minutes:02}:{seconds:02}");

    // 100ns ticks
    let ticks = d.subsec_nanos() / 100;
    if ticks > 0 {
        let fraction = format!("{ticks:07}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out
}

/// Render results as the CSV report, header included.
pub fn render_csv(results: &[EncodeResult]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + results.len() * 48);
    out.push_str(CSV_HEADER);
    out.push('\n');

    for r in results {
        // Failed rows carry the marker and no size, whatever the last attempt wrote.
        let (vmaf, size) = match (&r.status, r.vmaf) {
            (JobStatus::Succeeded, Some(score)) => (score.to_string(), r.size_bytes),
            _ => (FAILED_MARKER.to_string(), 0),
        };
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            r.index,
            escape_field(&r.preset),
            r.quality,
            vmaf,
            size,
            format_processor_time(r.processor_time)
        );
    }
    out
}

/// Quote a field when it contains a separator, quote or line break.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// The report file, opened before any job runs.
#[derive(Debug)]
pub struct ReportWriter {
    path: PathBuf,
    file: File,
}

impl ReportWriter {
    /// Create (or truncate) the report at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            Error::config(format!(
                "report path {} is not writable: {e}",
                path.display()
            ))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the rendered report and flush it to disk.
    pub fn write(mut self, results: &[EncodeResult]) -> Result<PathBuf> {
        self.file.write_all(render_csv(results).as_bytes())?;
        self.file.sync_all()?;
        Ok(self.path)
    }
}
