//! H.264 Sequence Parameter Set (SPS) parsing

use crate::codec::rbsp::{ParseResult, RbspReader};
use crate::codec::MAX_DIMENSION;
use crate::error::BitstreamErrorKind;
use crate::types::{Codec, CropWindow, Dimensions, SequenceInfo};

/// Profiles whose SPS carries chroma format and bit depth fields.
const HIGH_PROFILES: [u8; 13] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

/// Sequence Parameter Set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane: bool,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub log2_max_frame_num: u32,
    pub pic_order_cnt_type: u32,
    /// Only meaningful for `pic_order_cnt_type == 0`.
    pub log2_max_pic_order_cnt_lsb: u32,
    pub frame_mbs_only: bool,
    pub pic_width_in_mbs: u32,
    pub pic_height_in_map_units: u32,
    /// Crop in luma samples.
    pub crop: CropWindow,
}

impl Sps {
    /// Decoded frame size before cropping.
    pub fn coded_dimensions(&self) -> Dimensions {
        let frame_height_in_mbs = (2 - self.frame_mbs_only as u32) * self.pic_height_in_map_units;
        Dimensions::new(self.pic_width_in_mbs * 16, frame_height_in_mbs * 16)
    }

    /// Output size after the frame cropping rectangle.
    pub fn cropped_dimensions(&self) -> Dimensions {
        let coded = self.coded_dimensions();
        Dimensions::new(
            coded.width - self.crop.left - self.crop.right,
            coded.height - self.crop.top - self.crop.bottom,
        )
    }

    pub fn sequence_info(&self) -> SequenceInfo {
        SequenceInfo {
            codec: Codec::H264,
            sps_id: self.sps_id,
            profile_idc: self.profile_idc,
            level_idc: self.level_idc,
            chroma_format_idc: self.chroma_format_idc,
            bit_depth_luma: self.bit_depth_luma,
            bit_depth_chroma: self.bit_depth_chroma,
            coded: self.coded_dimensions(),
            cropped: self.cropped_dimensions(),
            crop: self.crop,
            alignment: if self.frame_mbs_only { 16 } else { 32 },
        }
    }
}

/// Parse an SPS RBSP (NAL header already removed).
pub fn parse_sps(rbsp: &[u8]) -> ParseResult<Sps> {
    let mut r = RbspReader::new(rbsp);

    let profile_idc = r.u(8, "profile_idc")? as u8;
    let constraint_flags = r.u(8, "constraint_set_flags")? as u8;
    let level_idc = r.u(8, "level_idc")? as u8;
    let sps_id = r.ue_max("seq_parameter_set_id", 31)?;

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;
    if HIGH_PROFILES.contains(&profile_idc) {
        chroma_format_idc = r.ue_max("chroma_format_idc", 3)?;
        if chroma_format_idc == 3 {
            separate_colour_plane = r.flag("separate_colour_plane_flag")?;
        }
        bit_depth_luma = r.ue_max("bit_depth_luma_minus8", 6)? as u8 + 8;
        bit_depth_chroma = r.ue_max("bit_depth_chroma_minus8", 6)? as u8 + 8;
        r.flag("qpprime_y_zero_transform_bypass_flag")?;
        if r.flag("seq_scaling_matrix_present_flag")? {
            let lists = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..lists {
                if r.flag("seq_scaling_list_present_flag")? {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num = r.ue_max("log2_max_frame_num_minus4", 12)? + 4;
    let pic_order_cnt_type = r.ue_max("pic_order_cnt_type", 2)?;
    let mut log2_max_pic_order_cnt_lsb = 0;
    match pic_order_cnt_type {
        0 => {
            log2_max_pic_order_cnt_lsb = r.ue_max("log2_max_pic_order_cnt_lsb_minus4", 12)? + 4;
        }
        1 => {
            r.flag("delta_pic_order_always_zero_flag")?;
            r.se("offset_for_non_ref_pic")?;
            r.se("offset_for_top_to_bottom_field")?;
            let cycle = r.ue_max("num_ref_frames_in_pic_order_cnt_cycle", 255)?;
            for _ in 0..cycle {
                r.se("offset_for_ref_frame")?;
            }
        }
        _ => {}
    }

    r.ue("max_num_ref_frames")?;
    r.flag("gaps_in_frame_num_value_allowed_flag")?;
    let pic_width_in_mbs = r.ue_max("pic_width_in_mbs_minus1", MAX_DIMENSION / 16)? + 1;
    let pic_height_in_map_units =
        r.ue_max("pic_height_in_map_units_minus1", MAX_DIMENSION / 16)? + 1;
    let frame_mbs_only = r.flag("frame_mbs_only_flag")?;
    if !frame_mbs_only {
        r.flag("mb_adaptive_frame_field_flag")?;
    }
    r.flag("direct_8x8_inference_flag")?;

    let mut crop = CropWindow::default();
    if r.flag("frame_cropping_flag")? {
        let left = r.ue("frame_crop_left_offset")?;
        let right = r.ue("frame_crop_right_offset")?;
        let top = r.ue("frame_crop_top_offset")?;
        let bottom = r.ue("frame_crop_bottom_offset")?;

        let chroma_array_type = if separate_colour_plane { 0 } else { chroma_format_idc };
        let field_factor = 2 - frame_mbs_only as u64;
        let (unit_x, unit_y) = match chroma_array_type {
            0 => (1, field_factor),
            1 => (2, 2 * field_factor),
            2 => (2, field_factor),
            _ => (1, field_factor),
        };
        let scale = |v: u32, unit: u64| (v as u64 * unit).min(u32::MAX as u64) as u32;
        crop = CropWindow {
            left: scale(left, unit_x),
            right: scale(right, unit_x),
            top: scale(top, unit_y),
            bottom: scale(bottom, unit_y),
        };
    }

    let sps = Sps {
        profile_idc,
        constraint_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_frame_num,
        pic_order_cnt_type,
        log2_max_pic_order_cnt_lsb,
        frame_mbs_only,
        pic_width_in_mbs,
        pic_height_in_map_units,
        crop,
    };

    let coded = sps.coded_dimensions();
    let crop_x = crop.left as u64 + crop.right as u64;
    let crop_y = crop.top as u64 + crop.bottom as u64;
    if crop_x >= coded.width as u64 {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "frame_crop_left_offset",
            value: crop_x,
        });
    }
    if crop_y >= coded.height as u64 {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "frame_crop_top_offset",
            value: crop_y,
        });
    }

    Ok(sps)
}

/// Consume one `scaling_list()` of `size` coefficients.
fn skip_scaling_list(r: &mut RbspReader<'_>, size: usize) -> ParseResult<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = r.se("delta_scale")?;
            if !(-128..=127).contains(&delta) {
                return Err(BitstreamErrorKind::OutOfRange {
                    field: "delta_scale",
                    value: delta.unsigned_abs() as u64,
                });
            }
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}
