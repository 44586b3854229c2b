//! Argument vectors for ffmpeg's transcode and score modes.
//!
//! Both builders produce a [`ToolCommand`]; nothing here spawns a process.

use std::path::Path;
use std::time::Duration;

use sweep_core::config::ScoreConfig;

use crate::command::ToolCommand;

/// Arguments common to every ffmpeg invocation.
const COMMON_ARGS: [&str; 2] = ["-hide_banner", "-nostdin"];

/// Build the transcode invocation for one job:
///
/// `ffmpeg -hide_banner -nostdin -y -i <input> <extra…> -preset <p> -crf <q> <output>`
pub fn transcode_command(
    ffmpeg: &Path,
    input: &Path,
    extra_args: &[String],
    preset: &str,
    quality: u32,
    output: &Path,
    timeout: Option<Duration>,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.args(COMMON_ARGS)
        .arg("-y")
        .arg("-i")
        .path_arg(input)
        .args(extra_args.iter().cloned())
        .arg("-preset")
        .arg(preset)
        .arg("-crf")
        .arg(quality.to_string())
        .path_arg(output)
        .timeout(timeout);
    cmd
}

/// Build the scoring invocation comparing `distorted` against `reference`:
///
/// `ffmpeg -hide_banner -nostdin -i <distorted> -i <reference> -lavfi <graph> -f null -`
pub fn score_command(
    ffmpeg: &Path,
    distorted: &Path,
    reference: &Path,
    score: &ScoreConfig,
    timeout: Option<Duration>,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.args(COMMON_ARGS)
        .arg("-i")
        .path_arg(distorted)
        .arg("-i")
        .path_arg(reference)
        .arg("-lavfi")
        .arg(vmaf_filter(score))
        .args(["-f", "null", "-"])
        .timeout(timeout);
    cmd
}

/// The libvmaf filter graph. The distorted stream is the filter's first input.
pub fn vmaf_filter(score: &ScoreConfig) -> String {
    let mut options = Vec::new();
    if let Some(model) = &score.model {
        options.push(format!("model={model}"));
    }
    if let Some(threads) = score.threads {
        options.push(format!("n_threads={threads}"));
    }

    if options.is_empty() {
        "[0:v][1:v]libvmaf".to_string()
    } else {
        format!("[0:v][1:v]libvmaf={}", options.join(":"))
    }
}
