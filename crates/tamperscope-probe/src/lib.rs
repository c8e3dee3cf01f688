//! Tamperscope-Probe: H.264 and HEVC bitstream analysis
//!
//! Reads just enough of a video elementary stream to answer forensic
//! questions about it: which NAL units a sample holds, the coded and cropped
//! picture size of each sequence, whether a picture is a random access point,
//! where it sits in picture order, and which display orientation the encoder
//! signalled in SEI.
//!
//! Slice data itself is never decoded. Nothing here knows about containers;
//! callers pass byte slices together with the file offset they came from, and
//! every [`BitstreamError`] carries that absolute offset.
//!
//! # Modules
//!
//! - `codec` - NAL framing, RBSP reading, H.264/HEVC parameter sets, slice
//!   headers and SEI
//! - `config` - `avcC` / `hvcC` decoder configuration records
//! - `analyzer` - Per-track analysis of samples and candidate ranges
//! - `synth` - Synthetic NAL unit writer for tests (feature `synth`)

pub mod analyzer;
pub mod codec;
pub mod config;
pub mod error;
#[cfg(feature = "synth")]
pub mod synth;
pub mod types;

pub use analyzer::{SampleAnalysis, StreamAnalyzer};
pub use codec::nal::{NalFormat, NalRange};
pub use config::DecoderConfig;
pub use error::{BitstreamError, BitstreamErrorKind, ParameterSetKind, Result};
pub use types::{
    BitstreamUnit, Codec, CropWindow, Dimensions, DisplayOrientation, NalClass, PictureInfo,
    RecoveryPoint, SequenceInfo, SliceType,
};
