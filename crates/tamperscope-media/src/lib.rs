//! Tamperscope-Media: ISO-BMFF box tree and sample table resolution
//!
//! This crate parses MP4/MOV containers into a lossless box tree and
//! resolves every track's sample tables into absolute byte ranges. It is the
//! bottom layer of tamperscope: everything above it reasons about which bytes
//! of a file are referenced by which track.
//!
//! # Modules
//!
//! - `mp4` - Box tree parser, track headers, sample tables, edit lists,
//!   fragments and QuickTime metadata
//! - `synth` - Synthetic MP4 writer for tests (feature `synth`)
//!
//! # Usage
//!
//! ```no_run
//! use std::fs::File;
//! use tamperscope_media::mp4::{BoxReader, Movie};
//!
//! # fn main() -> tamperscope_media::Result<()> {
//! let mut reader = BoxReader::from_seekable(File::open("clip.mov")?)?;
//! let tree = reader.read_tree()?;
//! let movie = Movie::parse(&mut reader, &tree)?;
//! for track in &movie.tracks {
//!     println!("track {} ({:?})", track.track_id, track.handler);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod mp4;
#[cfg(feature = "synth")]
pub mod synth;

pub use error::{Error, ResolutionError, Result, StructuralError, StructuralErrorKind};
pub use mp4::{BoxBody, BoxReader, BoxTree, ByteRange, FourCc, Movie, Mp4Box};
