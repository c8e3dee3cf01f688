use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tamperscope_forensics::{
    default_editor_signatures, CheckToggles, ForensicOptions, RecoveryOptions, SamplingOptions,
    ScoringWeights,
};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub checks: ChecksConfig,

    #[serde(default)]
    pub scoring: ScoringWeights,

    #[serde(default)]
    pub sampling: SamplingOptions,

    #[serde(default)]
    pub recovery: RecoveryOptions,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Options handed to the per-file analysis.
    pub fn forensic_options(&self) -> ForensicOptions {
        ForensicOptions {
            checks: self.checks.toggles(),
            weights: self.scoring.clone(),
            signatures: self.checks.editor_signatures.clone(),
            sampling: self.sampling.clone(),
            recovery: self.recovery.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChecksConfig {
    #[serde(default = "default_true")]
    pub trim: bool,

    #[serde(default = "default_true")]
    pub crop: bool,

    #[serde(default = "default_true")]
    pub rotate: bool,

    /// Substrings of metadata values that identify an editing application
    #[serde(default = "default_editor_signatures")]
    pub editor_signatures: Vec<String>,
}

impl ChecksConfig {
    pub fn toggles(&self) -> CheckToggles {
        CheckToggles {
            trim: self.trim,
            crop: self.crop,
            rotate: self.rotate,
        }
    }
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            trim: true,
            crop: true,
            rotate: true,
            editor_signatures: default_editor_signatures(),
        }
    }
}

/// External decoder verification of recovered frames.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Explicit ffmpeg binary; looked up on PATH when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default = "default_verify_timeout")]
    pub timeout_secs: u64,

    /// Decoder processes running at once
    #[serde(default = "default_verify_concurrency")]
    pub concurrency: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ffmpeg_path: None,
            timeout_secs: default_verify_timeout(),
            concurrency: default_verify_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Worker threads; 0 uses one per CPU
    #[serde(default)]
    pub jobs: usize,

    /// File extensions picked up when a directory is analyzed
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl BatchConfig {
    pub fn worker_count(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

fn default_true() -> bool {
    true
}

fn default_verify_timeout() -> u64 {
    30
}

fn default_verify_concurrency() -> usize {
    4
}

fn default_extensions() -> Vec<String> {
    ["mp4", "mov", "m4v", "3gp"]
        .into_iter()
        .map(String::from)
        .collect()
}
