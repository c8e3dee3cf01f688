//! One file through the whole pipeline: box tree, movie, forensic checks,
//! recovered frame streams.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tamperscope_forensics::{analyze_movie, structure_anomalies, ForensicOptions};
use tamperscope_media::mp4::{BoxReader, Movie};
use tracing::{debug, info, warn};

use crate::extract::{frame_streams, FrameStream};
use crate::report::FileReport;

/// Report plus the elementary streams of the recovered pictures.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub report: FileReport,
    pub streams: Vec<FrameStream>,
}

/// Analyze a file on disk.
pub fn analyze_file(path: &Path, options: &ForensicOptions) -> Result<FileAnalysis> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    analyze_source(BufReader::new(file), path.to_path_buf(), options)
}

/// Analyze any seekable source; `path` is only used for the report.
///
/// Problems inside the file end up in the report. An error is returned only
/// when the source itself cannot be read.
pub fn analyze_source<R: Read + Seek>(
    source: R,
    path: PathBuf,
    options: &ForensicOptions,
) -> Result<FileAnalysis> {
    let mut reader = BoxReader::from_seekable(source)
        .with_context(|| format!("Failed to read {:?}", path))?;
    info!("Analyzing {:?} ({} bytes)", path, reader.file_size());

    let tree = reader
        .read_tree()
        .with_context(|| format!("Failed to parse box tree of {:?}", path))?;
    let mut report = FileReport::new(path, reader.file_size()).with_tree(&tree);

    if let Some(fatal) = tree.fatal_error() {
        report.errors.push(fatal.to_string());
        report.anomalies = structure_anomalies(&tree, &options.weights);
        return Ok(FileAnalysis {
            report,
            streams: Vec::new(),
        });
    }

    let movie = match Movie::parse(&mut reader, &tree) {
        Ok(movie) => movie,
        Err(e) => {
            warn!("Cannot build movie for {:?}: {}", report.path, e);
            report.errors.push(e.to_string());
            report.anomalies = structure_anomalies(&tree, &options.weights);
            return Ok(FileAnalysis {
                report,
                streams: Vec::new(),
            });
        }
    };

    let findings = analyze_movie(&mut reader, &tree, &movie, options);

    let streams = match frame_streams(&mut reader, &findings) {
        Ok(streams) => streams,
        Err(e) => {
            warn!("Cannot extract recovered frames of {:?}: {}", report.path, e);
            report.errors.push(e.to_string());
            Vec::new()
        }
    };
    let report = report.with_findings(&movie, findings);
    debug!(
        anomalies = report.anomalies.len(),
        frames = report.recovery.frames.len(),
        "analysis finished"
    );
    Ok(FileAnalysis { report, streams })
}
