//! Job grid generation.
//!
//! A batch runs one job per (preset, quality) combination. The grid iterates
//! presets in their configured order and, for each preset, quality levels from
//! the minimum to the maximum inclusive. The position of a job in that order is
//! its identity and becomes the "Order" column of the report.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The ten x264/x265 speed presets, fastest first.
pub const DEFAULT_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// Lowest CRF accepted by x264.
pub const DEFAULT_QUALITY_MIN: u32 = 0;

/// Highest CRF accepted by 8-bit x264.
pub const DEFAULT_QUALITY_MAX: u32 = 51;

/// A single encode setting to benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobSpec {
    /// Position in generation order.
    pub index: usize,
    /// Encoder speed preset.
    pub preset: String,
    /// Quality level (CRF).
    pub quality: u32,
}

impl JobSpec {
    pub fn new(index: usize, preset: impl Into<String>, quality: u32) -> Self {
        Self {
            index,
            preset: preset.into(),
            quality,
        }
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} crf={}", self.index, self.preset, self.quality)
    }
}

/// The preset × quality grid a batch runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobGrid {
    pub presets: Vec<String>,
    #[serde(rename = "crf_min")]
    pub quality_min: u32,
    #[serde(rename = "crf_max")]
    pub quality_max: u32,
}

impl Default for JobGrid {
    fn default() -> Self {
        Self {
            presets: DEFAULT_PRESETS.iter().map(|p| p.to_string()).collect(),
            quality_min: DEFAULT_QUALITY_MIN,
            quality_max: DEFAULT_QUALITY_MAX,
        }
    }
}

impl JobGrid {
    pub fn new(presets: Vec<String>, quality_min: u32, quality_max: u32) -> Self {
        Self {
            presets,
            quality_min,
            quality_max,
        }
    }

    /// Number of quality levels per preset.
    pub fn levels(&self) -> usize {
        if self.quality_min > self.quality_max {
            0
        } else {
            (self.quality_max - self.quality_min + 1) as usize
        }
    }

    /// Total number of jobs in the grid.
    pub fn len(&self) -> usize {
        self.presets.len() * self.levels()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the grid in canonical order. Each call starts from the first
    /// job again.
    pub fn iter(&self) -> JobGridIter<'_> {
        JobGridIter {
            grid: self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a JobGrid {
    type Item = JobSpec;
    type IntoIter = JobGridIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a [`JobGrid`].
#[derive(Debug, Clone)]
pub struct JobGridIter<'a> {
    grid: &'a JobGrid,
    next: usize,
}

impl Iterator for JobGridIter<'_> {
    type Item = JobSpec;

    fn next(&mut self) -> Option<JobSpec> {
        let levels = self.grid.levels();
        if self.next >= self.grid.len() {
            return None;
        }

        let index = self.next;
        self.next += 1;

        Some(JobSpec {
            index,
            preset: self.grid.presets[index / levels].clone(),
            quality: self.grid.quality_min + (index % levels) as u32,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for JobGridIter<'_> {}
