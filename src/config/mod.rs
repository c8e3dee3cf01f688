mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./tamperscope.toml", "~/.config/tamperscope/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let out_of_range = config.scoring.out_of_range();
    if !out_of_range.is_empty() {
        anyhow::bail!(
            "Scoring weights must be within [0, 1]: {}",
            out_of_range.join(", ")
        );
    }

    if config.sampling.max_sync_samples == 0 {
        anyhow::bail!("sampling.max_sync_samples cannot be 0");
    }

    if config.recovery.max_gap_bytes == 0 {
        anyhow::bail!("recovery.max_gap_bytes cannot be 0");
    }

    if config.verify.enabled {
        if config.verify.timeout_secs == 0 {
            anyhow::bail!("Verification is enabled but verify.timeout_secs is 0");
        }
        if config.verify.concurrency == 0 {
            anyhow::bail!("Verification is enabled but verify.concurrency is 0");
        }
    }

    if config.batch.extensions.is_empty() {
        anyhow::bail!("batch.extensions cannot be empty");
    }

    if let Some(path) = &config.verify.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg does not exist: {:?}", path);
        }
    }

    Ok(())
}
