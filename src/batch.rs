//! Many files at once: discovery and a bounded worker pool.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tamperscope_forensics::ForensicOptions;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::analysis::{analyze_file, FileAnalysis};
use crate::report::FileReport;

/// Expand the given paths into the files to analyze.
///
/// Files named directly are always kept. Directories are walked and only
/// files with one of `extensions` (case-insensitive) are kept. The result
/// is sorted and free of duplicates.
pub fn discover_files(paths: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let mut files = BTreeSet::new();

    for path in paths {
        if !path.is_dir() {
            files.insert(path.clone());
            continue;
        }

        info!("Scanning directory: {:?}", path);
        for entry in WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let file_path = entry.path();
            if entry.file_type().is_file() && has_extension(file_path, extensions) {
                files.insert(file_path.to_path_buf());
            }
        }
    }

    files.into_iter().collect()
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

/// Analyze every file on a pool of `jobs` threads.
///
/// Results are in input order. A file that cannot be read yields a report
/// carrying the error; it never stops the batch.
pub fn analyze_batch(
    files: &[PathBuf],
    options: &ForensicOptions,
    jobs: usize,
) -> Result<Vec<FileAnalysis>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to build worker pool")?;

    info!("Analyzing {} file(s) on {} worker(s)", files.len(), jobs.max(1));

    Ok(pool.install(|| {
        files
            .par_iter()
            .map(|path| analyze_isolated(path, options))
            .collect()
    }))
}

fn analyze_isolated(path: &Path, options: &ForensicOptions) -> FileAnalysis {
    match analyze_file(path, options) {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("Skipping {:?}: {:#}", path, e);
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            let mut report = FileReport::new(path, size);
            report.errors.push(format!("{:#}", e));
            FileAnalysis {
                report,
                streams: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> Vec<String> {
        vec!["mp4".to_string(), "mov".to_string()]
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir(root.join("nested")).unwrap();
        for name in ["b.mp4", "a.MOV", "notes.txt", "nested/c.mp4"] {
            std::fs::write(root.join(name), b"x").unwrap();
        }

        let files = discover_files(&[root.to_path_buf()], &extensions());
        assert_eq!(
            files,
            vec![root.join("a.MOV"), root.join("b.mp4"), root.join("nested/c.mp4")]
        );
    }

    #[test]
    fn test_explicit_files_are_kept_once() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("clip.bin");
        std::fs::write(&file, b"x").unwrap();

        let files = discover_files(&[file.clone(), file.clone()], &extensions());
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_missing_file_is_isolated() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("missing.mp4");

        let results = analyze_batch(&[missing.clone()], &ForensicOptions::default(), 2).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].report.path, missing);
        assert_eq!(results[0].report.errors.len(), 1);
    }
}
