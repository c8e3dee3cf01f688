//! HEVC (H.265) codec parsing
//!
//! This module provides parsing of HEVC NAL units to extract:
//! - Video Parameter Set (VPS) ids
//! - Sequence Parameter Set (SPS) geometry, including the conformance window
//!   and CTB layout
//! - Picture Parameter Set (PPS) fields needed by slice headers
//! - Slice segment headers up to the picture order count

mod nal;
mod pps;
mod slice;
mod sps;

pub use nal::{NalHeader, NalUnitType};
pub use pps::{parse_pps, Pps};
pub use slice::{parse_slice_header, SliceHeader};
pub use sps::{parse_sps, parse_vps_id, ProfileTierLevel, Sps};

pub(crate) use slice::starts_picture;

use std::collections::{BTreeMap, BTreeSet};

pub const NAL_VPS: u8 = 32;
pub const NAL_SPS: u8 = 33;
pub const NAL_PPS: u8 = 34;
pub const NAL_AUD: u8 = 35;
pub const NAL_PREFIX_SEI: u8 = 39;
pub const NAL_SUFFIX_SEI: u8 = 40;

/// Active parameter sets keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ParameterSets {
    pub vps: BTreeSet<u8>,
    pub sps: BTreeMap<u32, Sps>,
    pub pps: BTreeMap<u32, Pps>,
}
