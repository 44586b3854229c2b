//! Token matchers for ffmpeg output lines.
//!
//! Each matcher inspects a single line and returns a typed value when its
//! token is present and well formed. Malformed or placeholder values
//! (`time=N/A`) yield `None`; matchers never fail.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// `time=HH:MM:SS.ss` as printed in ffmpeg's stats line. The token must start
/// the line or follow whitespace so `out_time=` from `-progress` output does
/// not match.
static TIME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)time=(\d+):(\d{1,2}):(\d{1,2})(?:\.(\d+))?").expect("valid regex")
});

/// `VMAF score: 95.32` as printed by the libvmaf filter. Anything after the
/// number (`e=N/A`, a log prefix, ...) is not part of the match.
static VMAF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"VMAF score:\s*(\d+(?:\.\d+)?)").expect("valid regex"));

/// Extract the encode position from an ffmpeg progress line.
pub fn progress_time(line: &str) -> Option<Duration> {
    let caps = TIME_REGEX.captures(line)?;

    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    let nanos = match caps.get(4) {
        Some(frac) => fraction_to_nanos(frac.as_str())?,
        None => 0,
    };

    let whole = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?;
    Some(Duration::new(whole, nanos))
}

/// Convert the digits after a decimal point to nanoseconds, truncating
/// anything finer than a nanosecond.
fn fraction_to_nanos(digits: &str) -> Option<u32> {
    let significant = &digits[..digits.len().min(9)];
    let value: u32 = significant.parse().ok()?;
    Some(value * 10u32.pow(9 - significant.len() as u32))
}

/// Extract the aggregate VMAF score from a libvmaf output line.
pub fn vmaf_score(line: &str) -> Option<f64> {
    let caps = VMAF_REGEX.captures(line)?;
    let score: f64 = caps[1].parse().ok()?;
    score.is_finite().then_some(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_yields_position() {
        let line = "frame=100 fps=30 q=28 size=2048kB time=00:01:23.45 bitrate=900kbits/s";
        assert_eq!(progress_time(line), Some(Duration::from_millis(83_450)));
    }

    #[test]
    fn progress_not_available_is_ignored() {
        let line = "frame=0 fps=0.0 q=0.0 size=0kB time=N/A bitrate=N/A speed=N/A";
        assert_eq!(progress_time(line), None);
    }

    #[test]
    fn progress_without_fraction() {
        assert_eq!(
            progress_time("time=01:00:00 bitrate=1kbits/s"),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn progress_with_long_fraction() {
        assert_eq!(
            progress_time("size=1kB time=00:00:01.1234567891 bitrate=1"),
            Some(Duration::new(1, 123_456_789))
        );
    }

    #[test]
    fn out_time_is_not_progress() {
        assert_eq!(progress_time("out_time=00:00:05.000000"), None);
    }

    #[test]
    fn out_of_range_fields_are_ignored() {
        assert_eq!(progress_time("time=00:75:00.00"), None);
        assert_eq!(progress_time("time=00:00:99.00"), None);
    }

    #[test]
    fn negative_timestamp_is_ignored() {
        assert_eq!(progress_time("size=0kB time=-00:00:00.04 bitrate=N/A"), None);
    }

    #[test]
    fn unrelated_line_has_no_progress() {
        assert_eq!(progress_time("Stream mapping:"), None);
    }

    #[test]
    fn vmaf_line_yields_score() {
        let line = "[libvmaf @ 0x55d0c8c0a8c0] VMAF score: 95.321234";
        assert_eq!(vmaf_score(line), Some(95.321234));
    }

    #[test]
    fn vmaf_trailing_text_is_excluded() {
        assert_eq!(vmaf_score("VMAF score: 97.428043 e=N/A"), Some(97.428043));
        assert_eq!(vmaf_score("VMAF score: 97.428043e=N/A"), Some(97.428043));
    }

    #[test]
    fn vmaf_integer_score() {
        assert_eq!(vmaf_score("VMAF score: 100"), Some(100.0));
    }

    #[test]
    fn vmaf_missing_number() {
        assert_eq!(vmaf_score("VMAF score: nan"), None);
        assert_eq!(vmaf_score("VMAF score:"), None);
    }

    #[test]
    fn unrelated_line_has_no_score() {
        assert_eq!(vmaf_score("frame=  240 fps= 30 q=-0.0 Lsize=N/A"), None);
    }
}
