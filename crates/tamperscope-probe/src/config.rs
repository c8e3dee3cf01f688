//! Decoder configuration records (`avcC`, `hvcC`).
//!
//! MP4 sample entries carry parameter sets out of band. Both record types
//! give the NAL length size used inside samples and the raw parameter set
//! units the analyzer must be seeded with.

use serde::Serialize;

use crate::error::BitstreamErrorKind;
use crate::types::Codec;

/// A parsed decoder configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecoderConfig {
    pub codec: Codec,
    pub profile_idc: u8,
    pub level_idc: u8,
    /// Bytes in each sample NAL length prefix.
    pub nal_length_size: u8,
    /// Parameter set NAL units (header included) in record order.
    #[serde(skip)]
    pub parameter_sets: Vec<Vec<u8>>,
}

impl DecoderConfig {
    /// Parse a record payload for `codec`.
    pub fn parse(codec: Codec, data: &[u8]) -> Result<Self, BitstreamErrorKind> {
        match codec {
            Codec::H264 => parse_avcc(data),
            Codec::Hevc => parse_hvcc(data),
        }
    }
}

fn invalid(msg: impl Into<String>) -> BitstreamErrorKind {
    BitstreamErrorKind::InvalidConfig(msg.into())
}

/// Read `count` u16-length-prefixed units starting at `*pos`.
fn read_units(
    data: &[u8],
    pos: &mut usize,
    count: usize,
    out: &mut Vec<Vec<u8>>,
) -> Result<(), BitstreamErrorKind> {
    for _ in 0..count {
        let len_bytes = data
            .get(*pos..*pos + 2)
            .ok_or_else(|| invalid(format!("unit length truncated at byte {}", *pos)))?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        *pos += 2;
        let unit = data.get(*pos..*pos + len).ok_or_else(|| {
            invalid(format!(
                "unit of {len} bytes at byte {} exceeds record of {} bytes",
                *pos,
                data.len()
            ))
        })?;
        out.push(unit.to_vec());
        *pos += len;
    }
    Ok(())
}

/// AVCDecoderConfigurationRecord
pub fn parse_avcc(data: &[u8]) -> Result<DecoderConfig, BitstreamErrorKind> {
    if data.len() < 7 {
        return Err(invalid(format!("avcC too short: {} bytes", data.len())));
    }
    if data[0] != 1 {
        return Err(invalid(format!("avcC version {}", data[0])));
    }
    let profile_idc = data[1];
    let level_idc = data[3];
    let nal_length_size = (data[4] & 0x03) + 1;
    if nal_length_size == 3 {
        return Err(invalid("avcC length size 3"));
    }

    let mut parameter_sets = Vec::new();
    let mut pos = 6;
    read_units(data, &mut pos, (data[5] & 0x1F) as usize, &mut parameter_sets)?;
    let num_pps = *data
        .get(pos)
        .ok_or_else(|| invalid("avcC missing PPS count"))? as usize;
    pos += 1;
    read_units(data, &mut pos, num_pps, &mut parameter_sets)?;

    Ok(DecoderConfig {
        codec: Codec::H264,
        profile_idc,
        level_idc,
        nal_length_size,
        parameter_sets,
    })
}

/// HEVCDecoderConfigurationRecord
pub fn parse_hvcc(data: &[u8]) -> Result<DecoderConfig, BitstreamErrorKind> {
    // configurationVersion (8 bits)
    // general_profile_space (2) + general_tier_flag (1) + general_profile_idc (5)
    // general_profile_compatibility_flags (32)
    // general_constraint_indicator_flags (48)
    // general_level_idc (8)
    // min_spatial_segmentation_idc, parallelismType, chromaFormat,
    // bitDepthLumaMinus8, bitDepthChromaMinus8, avgFrameRate (8 bytes)
    // constantFrameRate (2) + numTemporalLayers (3) + temporalIdNested (1) + lengthSizeMinusOne (2)
    // numOfArrays (8)
    if data.len() < 23 {
        return Err(invalid(format!("hvcC too short: {} bytes", data.len())));
    }
    let profile_idc = data[1] & 0x1F;
    let level_idc = data[12];
    let nal_length_size = (data[21] & 0x03) + 1;
    if nal_length_size == 3 {
        return Err(invalid("hvcC length size 3"));
    }

    let mut parameter_sets = Vec::new();
    let mut pos = 23;
    for _ in 0..data[22] {
        let header = data
            .get(pos..pos + 3)
            .ok_or_else(|| invalid(format!("NAL array header truncated at byte {pos}")))?;
        let count = u16::from_be_bytes([header[1], header[2]]) as usize;
        pos += 3;
        read_units(data, &mut pos, count, &mut parameter_sets)?;
    }

    Ok(DecoderConfig {
        codec: Codec::Hevc,
        profile_idc,
        level_idc,
        nal_length_size,
        parameter_sets,
    })
}
