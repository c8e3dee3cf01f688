//! External tool discovery.
//!
//! ffmpeg is the only tool tamperscope calls, and only to confirm that a
//! recovered frame decodes. It is optional: a missing binary turns
//! verification into an "unavailable" verdict.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::VerifyConfig;

/// Tools reported by `check-tools`.
const KNOWN_TOOLS: &[&str] = &["ffmpeg"];

/// Availability information for a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolve ffmpeg: the configured path when it exists, else `PATH`.
pub fn find_ffmpeg(config: &VerifyConfig) -> Option<PathBuf> {
    resolve("ffmpeg", config.ffmpeg_path.as_deref())
}

fn resolve(name: &str, custom_path: Option<&Path>) -> Option<PathBuf> {
    match custom_path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        _ => which::which(name).ok(),
    }
}

/// Check every known tool.
pub fn check_all(config: &VerifyConfig) -> Vec<ToolInfo> {
    KNOWN_TOOLS
        .iter()
        .map(|&name| {
            let custom = match name {
                "ffmpeg" => config.ffmpeg_path.as_deref(),
                _ => None,
            };
            match resolve(name, custom) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&path),
                    path: Some(path),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            }
        })
        .collect()
}

fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_all_reports_known_tools() {
        let infos = check_all(&VerifyConfig::default());
        assert_eq!(infos.len(), KNOWN_TOOLS.len());
        assert_eq!(infos[0].name, "ffmpeg");
        for info in &infos {
            assert_eq!(info.available, info.path.is_some());
        }
    }

    #[test]
    fn test_missing_custom_path_falls_back_to_path_lookup() {
        let config = VerifyConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg-xyz")),
            ..VerifyConfig::default()
        };
        let found = find_ffmpeg(&config);
        assert_ne!(found, config.ffmpeg_path);
    }
}
