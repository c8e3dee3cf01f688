//! Codec bitstream parsers.

pub mod h264;
pub mod hevc;
pub mod nal;
pub mod rbsp;
pub mod sei;

use crate::error::BitstreamErrorKind;
use crate::types::{Codec, NalClass};

/// Largest picture dimension accepted from a parameter set.
pub const MAX_DIMENSION: u32 = 16384;

/// Codec-independent view of a NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader {
    pub nal_type: u8,
    pub class: NalClass,
    pub is_reference: bool,
    /// IDR (H.264) or IRAP (HEVC) slice.
    pub is_sync: bool,
}

/// Parse the NAL header at the start of `unit`.
pub fn unit_header(codec: Codec, unit: &[u8]) -> Result<UnitHeader, BitstreamErrorKind> {
    match codec {
        Codec::H264 => {
            let h = h264::NalHeader::parse(unit)?;
            Ok(UnitHeader {
                nal_type: h.nal_type,
                class: h.class(),
                is_reference: h.nal_ref_idc != 0,
                is_sync: h.is_idr(),
            })
        }
        Codec::Hevc => {
            let h = hevc::NalHeader::parse(unit)?;
            Ok(UnitHeader {
                nal_type: h.nal_type,
                class: h.class(),
                is_reference: h.is_reference(),
                is_sync: h.is_irap(),
            })
        }
    }
}

/// Whether `unit` is the first slice of a new coded picture.
pub fn begins_picture(codec: Codec, unit: &[u8]) -> bool {
    let Ok(header) = unit_header(codec, unit) else {
        return false;
    };
    if header.class != NalClass::Slice {
        return false;
    }
    let payload = &unit[codec.nal_header_size()..];
    // The first syntax elements sit well before any emulation prevention byte.
    let head = rbsp::remove_emulation_prevention(&payload[..payload.len().min(8)]);
    match codec {
        Codec::H264 => h264::starts_picture(&head),
        Codec::Hevc => hevc::starts_picture(&head),
    }
}

/// Whether `unit` may only appear before the first slice of an access unit.
pub fn precedes_picture(codec: Codec, unit: &[u8]) -> bool {
    let Ok(header) = unit_header(codec, unit) else {
        return false;
    };
    match codec {
        Codec::H264 => matches!(
            header.nal_type,
            h264::NAL_AUD | h264::NAL_SPS | h264::NAL_PPS | h264::NAL_SEI | 14..=18
        ),
        Codec::Hevc => matches!(
            header.nal_type,
            hevc::NAL_VPS | hevc::NAL_SPS | hevc::NAL_PPS | hevc::NAL_AUD | hevc::NAL_PREFIX_SEI
                | 41..=44
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begins_picture() {
        // H.264 IDR, first_mb_in_slice ue(0) = '1'
        assert!(begins_picture(Codec::H264, &[0x65, 0x88, 0x80]));
        // first_mb_in_slice ue(1) = '010'
        assert!(!begins_picture(Codec::H264, &[0x65, 0x40]));
        // HEVC TRAIL_R with first_slice_segment_in_pic_flag
        assert!(begins_picture(Codec::Hevc, &[0x02, 0x01, 0xC0]));
        assert!(!begins_picture(Codec::Hevc, &[0x02, 0x01, 0x40]));
        // SPS is not a slice
        assert!(!begins_picture(Codec::H264, &[0x67, 0x80]));
    }

    #[test]
    fn test_precedes_picture() {
        assert!(precedes_picture(Codec::H264, &[0x67]));
        assert!(precedes_picture(Codec::Hevc, &[0x4E, 0x01]));
        assert!(!precedes_picture(Codec::Hevc, &[0x50, 0x01]));
    }
}
