//! Integration tests for configuration loading and validation.

use std::path::Path;

use tamperscope::config::{load_config, load_config_or_default, validate_config, Config};

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("tamperscope.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_defaults() {
    let config = Config::default();
    validate_config(&config).unwrap();

    assert!(config.checks.trim && config.checks.crop && config.checks.rotate);
    assert!(!config.checks.editor_signatures.is_empty());
    assert!(config.recovery.enabled);
    assert!(!config.verify.enabled);
    assert_eq!(config.verify.timeout_secs, 30);
    assert_eq!(config.batch.extensions, vec!["mp4", "mov", "m4v", "3gp"]);
    assert!(config.output.pretty);
    assert!(config.batch.worker_count() >= 1);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_config(
        temp.path(),
        r#"
[checks]
rotate = false
editor_signatures = ["CapCut"]

[scoring]
edit_list_start_offset = 0.9

[recovery]
max_gap_bytes = 1024

[batch]
jobs = 3
"#,
    );
    let config = load_config(&path).unwrap();

    assert!(config.checks.trim);
    assert!(!config.checks.rotate);
    assert_eq!(config.checks.editor_signatures, vec!["CapCut"]);
    assert_eq!(config.scoring.edit_list_start_offset, 0.9);
    assert_eq!(config.scoring.crop_beyond_alignment, 0.5);
    assert_eq!(config.recovery.max_gap_bytes, 1024);
    assert!(config.recovery.enabled);
    assert_eq!(config.batch.worker_count(), 3);

    let options = config.forensic_options();
    assert!(!options.checks.rotate);
    assert_eq!(options.signatures, vec!["CapCut"]);
    assert_eq!(options.weights.edit_list_start_offset, 0.9);
    assert_eq!(options.recovery.max_gap_bytes, 1024);
}

#[test]
fn test_weight_out_of_range_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_config(temp.path(), "[scoring]\nnon_identity_transform = 1.5\n");
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("non_identity_transform"), "{err}");
}

#[test]
fn test_zero_limits_are_rejected() {
    let mut config = Config::default();
    config.recovery.max_gap_bytes = 0;
    assert!(validate_config(&config).is_err());

    let mut config = Config::default();
    config.sampling.max_sync_samples = 0;
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_zero_timeout_only_matters_when_verifying() {
    let mut config = Config::default();
    config.verify.timeout_secs = 0;
    validate_config(&config).unwrap();

    config.verify.enabled = true;
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_malformed_file_reports_path() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_config(temp.path(), "[checks\ntrim = ");
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_explicit_path_wins() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_config(temp.path(), "[output]\npretty = false\n");
    let config = load_config_or_default(Some(&path)).unwrap();
    assert!(!config.output.pretty);

    let missing = temp.path().join("missing.toml");
    assert!(load_config_or_default(Some(&missing)).is_err());
}

#[test]
fn test_example_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tamperscope.example.toml");
    let config = load_config(&path).unwrap();
    assert!(config.recovery.enabled);
}
