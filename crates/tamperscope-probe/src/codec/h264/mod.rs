//! H.264/AVC NAL units and parameter sets.

mod pps;
mod slice;
mod sps;

pub use pps::{parse_pps, Pps};
pub use slice::{parse_slice_header, SliceHeader};
pub use sps::{parse_sps, Sps};

pub(crate) use slice::starts_picture;

use std::collections::BTreeMap;

use crate::error::BitstreamErrorKind;
use crate::types::NalClass;

pub const NAL_SLICE: u8 = 1;
pub const NAL_SLICE_PARTITION_A: u8 = 2;
pub const NAL_SLICE_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;
pub const NAL_SPS_EXT: u8 = 13;
pub const NAL_SUBSET_SPS: u8 = 15;

/// One-byte NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_ref_idc: u8,
    pub nal_type: u8,
}

impl NalHeader {
    pub fn parse(data: &[u8]) -> Result<Self, BitstreamErrorKind> {
        let &byte = data.first().ok_or(BitstreamErrorKind::EmptyUnit)?;
        if byte & 0x80 != 0 {
            return Err(BitstreamErrorKind::ForbiddenBit);
        }
        Ok(Self {
            nal_ref_idc: (byte >> 5) & 0x03,
            nal_type: byte & 0x1F,
        })
    }

    pub fn is_idr(&self) -> bool {
        self.nal_type == NAL_SLICE_IDR
    }

    pub fn class(&self) -> NalClass {
        match self.nal_type {
            1..=5 => NalClass::Slice,
            NAL_SEI => NalClass::Sei,
            NAL_SPS | NAL_PPS | NAL_SPS_EXT | NAL_SUBSET_SPS => NalClass::ParameterSet,
            _ => NalClass::Other,
        }
    }

    /// Whether the unit carries a slice header this crate can read.
    pub fn has_slice_header(&self) -> bool {
        matches!(
            self.nal_type,
            NAL_SLICE | NAL_SLICE_PARTITION_A | NAL_SLICE_IDR
        )
    }
}

/// Active SPS and PPS tables keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ParameterSets {
    pub sps: BTreeMap<u32, Sps>,
    pub pps: BTreeMap<u32, Pps>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_header() {
        let h = NalHeader::parse(&[0x65]).unwrap();
        assert_eq!(h.nal_ref_idc, 3);
        assert!(h.is_idr());
        assert_eq!(h.class(), NalClass::Slice);

        let h = NalHeader::parse(&[0x01]).unwrap();
        assert_eq!(h.nal_ref_idc, 0);
        assert_eq!(h.class(), NalClass::Slice);

        assert_eq!(NalHeader::parse(&[0x67]).unwrap().class(), NalClass::ParameterSet);
        assert_eq!(NalHeader::parse(&[0x06]).unwrap().class(), NalClass::Sei);
        assert_eq!(NalHeader::parse(&[0xE5]), Err(BitstreamErrorKind::ForbiddenBit));
        assert_eq!(NalHeader::parse(&[]), Err(BitstreamErrorKind::EmptyUnit));
    }
}
