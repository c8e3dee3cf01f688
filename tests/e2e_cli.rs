//! CLI end-to-end tests
//!
//! Tests for the tamperscope command-line interface.

mod common;

use assert_cmd::prelude::*;
use common::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the tamperscope binary
#[allow(deprecated)]
fn tamperscope_cmd() -> Command {
    Command::cargo_bin("tamperscope").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = tamperscope_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = tamperscope_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tamperscope"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = tamperscope_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "tamperscope {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = tamperscope_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"));
}

#[test]
fn test_cli_validate_default_config() {
    let temp = tempdir().unwrap();
    let mut cmd = tamperscope_cmd();
    cmd.current_dir(temp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"));
}

#[test]
fn test_cli_validate_rejects_bad_weight() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("bad.toml");
    fs::write(&config, "[scoring]\neditor_signature = -0.1\n").unwrap();

    let mut cmd = tamperscope_cmd();
    cmd.arg("validate")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("editor_signature"));
}

#[test]
fn test_cli_analyze_untouched_file() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "clean.mp4", &untouched_avc());

    let mut cmd = tamperscope_cmd();
    cmd.current_dir(temp.path())
        .arg("analyze")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("clean.mp4"))
        .stdout(predicate::str::contains("no anomalies"));
}

#[test]
fn test_cli_analyze_json_output_file() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "leftover.mov", &avc_with_leftover_frames(2));
    let output = temp.path().join("report.json");

    let mut cmd = tamperscope_cmd();
    cmd.current_dir(temp.path())
        .arg("analyze")
        .arg(&file)
        .arg("--json")
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let reports = json.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["recovery"]["frames"].as_array().unwrap().len(), 2);
    assert_eq!(reports[0]["anomalies"][0]["kind"], "unreferenced_region");
}

#[test]
fn test_cli_analyze_directory_with_extraction() {
    let temp = tempdir().unwrap();
    let media = temp.path().join("media");
    fs::create_dir(&media).unwrap();
    write_fixture(&media, "a.mp4", &untouched_avc());
    write_fixture(&media, "b.mp4", &avc_with_leftover_frames(2));
    write_fixture(&media, "notes.txt", b"not a movie");
    let frames = temp.path().join("frames");

    let mut cmd = tamperscope_cmd();
    cmd.current_dir(temp.path())
        .arg("analyze")
        .arg(&media)
        .arg("--jobs")
        .arg("2")
        .arg("--extract-dir")
        .arg(&frames)
        .assert()
        .success()
        .stdout(predicate::str::contains("a.mp4"))
        .stdout(predicate::str::contains("b.mp4"))
        .stdout(predicate::str::contains("notes.txt").not());

    assert!(frames.join("b.mp4/frame_0000.h264").exists());
    assert!(frames.join("b.mp4/frame_0001.h264").exists());
    assert!(!frames.join("a.mp4").exists());
}

#[test]
fn test_cli_analyze_isolates_broken_files() {
    let temp = tempdir().unwrap();
    let broken = write_fixture(temp.path(), "broken.mp4", &[0, 0, 0]);
    let clean = write_fixture(temp.path(), "clean.mp4", &untouched_avc());

    let mut cmd = tamperscope_cmd();
    cmd.current_dir(temp.path())
        .arg("analyze")
        .arg(&broken)
        .arg(&clean)
        .assert()
        .success()
        .stdout(predicate::str::contains("error:"))
        .stdout(predicate::str::contains("clean.mp4"));
}

#[test]
fn test_cli_analyze_missing_file_is_reported() {
    let temp = tempdir().unwrap();
    let mut cmd = tamperscope_cmd();
    cmd.current_dir(temp.path())
        .arg("analyze")
        .arg(temp.path().join("missing.mp4"))
        .assert()
        .success()
        .stdout(predicate::str::contains("error:"));
}

#[test]
fn test_cli_boxes_command() {
    let temp = tempdir().unwrap();
    let file = write_fixture(temp.path(), "clean.mp4", &untouched_avc());

    let mut cmd = tamperscope_cmd();
    cmd.arg("boxes")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("ftyp @0"))
        .stdout(predicate::str::contains("  mvhd @"));
}
