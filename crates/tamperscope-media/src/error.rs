//! Error types for tamperscope-media.

use std::io;
use thiserror::Error;

use crate::mp4::FourCc;

/// Result type for tamperscope-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for tamperscope-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The box structure is malformed.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// A track's sample tables disagree with each other.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Missing required box in the file.
    #[error("Missing required box: {0}")]
    MissingBox(&'static str),

    /// A box payload is larger than the parser is willing to load.
    #[error("Box {box_type} at offset {offset} has {size} payload bytes (limit {limit})")]
    PayloadTooLarge {
        box_type: FourCc,
        offset: u64,
        size: u64,
        limit: u64,
    },

    /// A byte range is larger than the parser is willing to load.
    #[error("Range at offset {offset} spans {size} bytes (limit {limit})")]
    RangeTooLarge { offset: u64, size: u64, limit: u64 },
}

/// A malformed box header or size field.
///
/// Errors recorded at the root level end parsing of the file; nested ones are
/// kept as evidence while the enclosing box is retained.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("{kind} at offset {offset} (depth {depth}, in {parent})")]
pub struct StructuralError {
    /// Absolute file offset of the offending box header.
    pub offset: u64,
    /// Nesting depth (0 for top-level boxes).
    pub depth: u32,
    /// Path of the enclosing box, `/` for the file root.
    pub parent: String,
    /// What went wrong.
    pub kind: StructuralErrorKind,
}

impl StructuralError {
    /// Root-level errors break the tiling of the file and abort its analysis.
    pub fn is_fatal(&self) -> bool {
        self.depth == 0
    }
}

/// Classification of a [`StructuralError`].
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuralErrorKind {
    /// Fewer than 8 bytes remained for a box header.
    #[error("truncated box header ({available} bytes available)")]
    TruncatedHeader { available: u64 },

    /// A size of 1 announced a 64-bit size that is not fully present.
    #[error("truncated 64-bit size extension")]
    TruncatedLargeSize,

    /// The declared size runs past the end of the parent or file.
    #[error("box '{box_type}' declares {declared} bytes but only {available} remain")]
    SizeExceedsParent {
        box_type: String,
        declared: u64,
        available: u64,
    },

    /// The declared size cannot even hold the header.
    #[error("box '{box_type}' declares size {declared}, smaller than its header")]
    SizeTooSmall { box_type: String, declared: u64 },

    /// Size 0 ("extends to end of file") used below the top level.
    #[error("zero-size box '{box_type}' not at end of file")]
    ZeroSizeNotAtEnd { box_type: String },
}

/// Sample table counts or references that cannot be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("track {track_id}: {message}")]
pub struct ResolutionError {
    /// Track id from the track header.
    pub track_id: u32,
    /// Human readable description of the inconsistency.
    pub message: String,
}

impl ResolutionError {
    /// Create a resolution error for a track.
    pub fn new(track_id: u32, message: impl Into<String>) -> Self {
        Self {
            track_id,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_error_display() {
        let err = StructuralError {
            offset: 120,
            depth: 0,
            parent: "/".to_string(),
            kind: StructuralErrorKind::TruncatedHeader { available: 3 },
        };
        assert_eq!(
            err.to_string(),
            "truncated box header (3 bytes available) at offset 120 (depth 0, in /)"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resolution_error_display() {
        let err = ResolutionError::new(2, "stts covers 9 samples, stsz declares 10");
        assert_eq!(
            err.to_string(),
            "track 2: stts covers 9 samples, stsz declares 10"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
