//! Recovered pictures as Annex-B elementary streams.
//!
//! Each picture is written as its own stream: the owning track's parameter
//! sets, then the picture's NAL units, every unit behind a 4-byte start
//! code. The bytes are copied from the file unchanged.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tamperscope_forensics::{FrameStatus, Findings};
use tamperscope_media::mp4::BoxReader;
use tamperscope_probe::Codec;
use tracing::debug;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Standalone stream for one recovered picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStream {
    /// Index into the recovery report's frames.
    pub frame: usize,
    pub codec: Codec,
    pub status: FrameStatus,
    pub data: Vec<u8>,
}

/// Build streams for every recovered picture.
pub fn frame_streams<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    findings: &Findings,
) -> Result<Vec<FrameStream>> {
    let mut streams = Vec::new();
    for (i, frame) in findings.recovery.frames.iter().enumerate() {
        if !frame.status.is_picture() {
            continue;
        }
        let mut data = Vec::new();
        if let Some(evidence) = findings.evidence.iter().find(|e| e.track_ref == frame.track) {
            for unit in evidence.analyzer.parameter_set_nals() {
                data.extend_from_slice(&START_CODE);
                data.extend_from_slice(unit);
            }
        }
        for unit in &frame.units {
            let bytes = reader
                .read_range(*unit)
                .with_context(|| format!("Failed to read recovered unit at {}", unit.offset))?;
            data.extend_from_slice(&START_CODE);
            data.extend_from_slice(&bytes);
        }
        streams.push(FrameStream {
            frame: i,
            codec: frame.codec,
            status: frame.status,
            data,
        });
    }
    Ok(streams)
}

/// Directory that holds the extracted frames of `source`.
pub fn extract_dir_for(root: &Path, source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    root.join(name)
}

/// Write the decodable streams to `<root>/<file name>/frame_NNNN.<ext>`.
///
/// Frames are numbered by their position in the recovery report.
pub fn write_frames(root: &Path, source: &Path, streams: &[FrameStream]) -> Result<Vec<PathBuf>> {
    let decodable: Vec<&FrameStream> = streams
        .iter()
        .filter(|s| s.status == FrameStatus::Decodable)
        .collect();
    if decodable.is_empty() {
        return Ok(Vec::new());
    }

    let dir = extract_dir_for(root, source);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create extraction directory: {:?}", dir))?;

    let mut written = Vec::with_capacity(decodable.len());
    for stream in decodable {
        let path = dir.join(format!(
            "frame_{:04}.{}",
            stream.frame,
            stream.codec.extension()
        ));
        std::fs::write(&path, &stream.data)
            .with_context(|| format!("Failed to write {:?}", path))?;
        debug!(path = %path.display(), bytes = stream.data.len(), "extracted frame");
        written.push(path);
    }
    Ok(written)
}
