//! CLI end-to-end tests
//!
//! Tests for the vmafsweep command-line interface. None of them need ffmpeg.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the vmafsweep binary
#[allow(deprecated)]
fn vmafsweep_cmd() -> Command {
    Command::cargo_bin("vmafsweep").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = vmafsweep_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = vmafsweep_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("vmafsweep"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = vmafsweep_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "vmafsweep {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_run_help() {
    let mut cmd = vmafsweep_cmd();
    cmd.args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--concurrency"))
        .stdout(predicate::str::contains("--max-attempts"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = vmafsweep_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("ffprobe"));
}

#[test]
fn test_cli_run_nonexistent_file() {
    let temp = tempdir().unwrap();
    let mut cmd = vmafsweep_cmd();
    cmd.current_dir(temp.path())
        .args(["run", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_run_rejects_zero_concurrency() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("movie.mkv");
    fs::write(&input, b"x").unwrap();
    let report = temp.path().join("report.csv");

    let mut cmd = vmafsweep_cmd();
    cmd.current_dir(temp.path())
        .args(["run", input.to_str().unwrap(), "-o", report.to_str().unwrap(), "-j", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));

    assert!(!report.exists());
}

#[test]
fn test_cli_probe_nonexistent_file() {
    let mut cmd = vmafsweep_cmd();
    cmd.args(["probe", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_grid_lists_jobs_in_order() {
    let temp = tempdir().unwrap();
    let mut cmd = vmafsweep_cmd();
    cmd.current_dir(temp.path())
        .args(["grid", "--presets", "fast,slow", "--crf-min", "20", "--crf-max", "21"])
        .assert()
        .success()
        .stdout(predicate::eq(
            "Order,Preset,CRF\n0,fast,20\n1,fast,21\n2,slow,20\n3,slow,21\n",
        ))
        .stderr(predicate::str::contains("4 jobs"));
}

#[test]
fn test_cli_grid_uses_config_file() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("vmafsweep.toml");
    fs::write(
        &config_file,
        r#"
[grid]
presets = ["medium"]
crf_min = 30
crf_max = 31
"#,
    )
    .unwrap();

    let mut cmd = vmafsweep_cmd();
    cmd.args(["--config", config_file.to_str().unwrap(), "grid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0,medium,30"))
        .stdout(predicate::str::contains("1,medium,31"));
}

#[test]
fn test_cli_grid_flag_overrides_invalid_config_value() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("vmafsweep.toml");
    fs::write(
        &config_file,
        r#"
[grid]
presets = ["medium"]
crf_min = 30
crf_max = 70
"#,
    )
    .unwrap();

    let mut cmd = vmafsweep_cmd();
    cmd.args([
        "--config",
        config_file.to_str().unwrap(),
        "grid",
        "--crf-max",
        "31",
    ])
    .assert()
    .success()
    .stdout(predicate::eq("Order,Preset,CRF\n0,medium,30\n1,medium,31\n"));
}

#[test]
fn test_cli_grid_rejects_inverted_range() {
    let temp = tempdir().unwrap();
    let mut cmd = vmafsweep_cmd();
    cmd.current_dir(temp.path())
        .args(["grid", "--crf-min", "30", "--crf-max", "20"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("crf_min"));
}

#[test]
fn test_cli_validate_valid_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");
    fs::write(
        &config_file,
        r#"
[batch]
concurrency = 4

[score]
threads = 2

[retry]
max_attempts = 3
"#,
    )
    .unwrap();

    let mut cmd = vmafsweep_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Concurrency: 4"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");
    fs::write(&config_file, "[retry]\nmax_attempts = 0\n").unwrap();

    let mut cmd = vmafsweep_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts"));
}

#[test]
fn test_cli_validate_malformed_toml() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");
    fs::write(&config_file, "[batch\nconcurrency = ").unwrap();

    let mut cmd = vmafsweep_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse"));
}
