//! HEVC Sequence and Video Parameter Set parsing

use crate::codec::rbsp::{ceil_log2, ParseResult, RbspReader};
use crate::codec::MAX_DIMENSION;
use crate::error::BitstreamErrorKind;
use crate::types::{Codec, CropWindow, Dimensions, SequenceInfo};

/// Profile and level from `profile_tier_level()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileTierLevel {
    pub profile_idc: u8,
    pub tier: bool,
    pub level_idc: u8,
}

/// Sequence Parameter Set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub vps_id: u8,
    pub max_sub_layers: u8,
    pub profile: ProfileTierLevel,
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane: bool,
    /// Picture width in luma samples
    pub width: u32,
    /// Picture height in luma samples
    pub height: u32,
    /// Conformance window in luma samples.
    pub conformance_window: CropWindow,
    /// Bit depth for luma samples
    pub bit_depth_luma: u8,
    /// Bit depth for chroma samples
    pub bit_depth_chroma: u8,
    pub log2_max_pic_order_cnt_lsb: u32,
    pub log2_min_cb_size: u32,
    pub log2_ctb_size: u32,
    pub num_short_term_ref_pic_sets: u32,
    pub long_term_ref_pics_present: bool,
    pub temporal_mvp_enabled: bool,
}

impl Sps {
    pub fn coded_dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn cropped_dimensions(&self) -> Dimensions {
        let w = &self.conformance_window;
        Dimensions::new(
            self.width - w.left - w.right,
            self.height - w.top - w.bottom,
        )
    }

    /// `PicSizeInCtbsY`.
    pub fn pic_size_in_ctbs(&self) -> u32 {
        let ctb = 1u32 << self.log2_ctb_size;
        self.width.div_ceil(ctb) * self.height.div_ceil(ctb)
    }

    /// Width of `slice_segment_address` in bits.
    pub fn slice_address_bits(&self) -> u32 {
        ceil_log2(self.pic_size_in_ctbs())
    }

    pub fn sequence_info(&self) -> SequenceInfo {
        SequenceInfo {
            codec: Codec::Hevc,
            sps_id: self.sps_id,
            profile_idc: self.profile.profile_idc,
            level_idc: self.profile.level_idc,
            chroma_format_idc: self.chroma_format_idc,
            bit_depth_luma: self.bit_depth_luma,
            bit_depth_chroma: self.bit_depth_chroma,
            coded: self.coded_dimensions(),
            cropped: self.cropped_dimensions(),
            crop: self.conformance_window,
            alignment: 1 << self.log2_min_cb_size,
        }
    }
}

/// `vps_video_parameter_set_id` from a VPS RBSP.
pub fn parse_vps_id(rbsp: &[u8]) -> ParseResult<u8> {
    let mut r = RbspReader::new(rbsp);
    let id = r.u(4, "vps_video_parameter_set_id")? as u8;
    r.flag("vps_base_layer_internal_flag")?;
    r.flag("vps_base_layer_available_flag")?;
    r.u(6, "vps_max_layers_minus1")?;
    let max_sub_layers_minus1 = r.u(3, "vps_max_sub_layers_minus1")? as u8;
    r.flag("vps_temporal_id_nesting_flag")?;
    r.u(16, "vps_reserved_0xffff_16bits")?;
    parse_profile_tier_level(&mut r, max_sub_layers_minus1)?;
    Ok(id)
}

/// Parse an SPS RBSP (two-byte NAL header already removed).
pub fn parse_sps(rbsp: &[u8]) -> ParseResult<Sps> {
    let mut r = RbspReader::new(rbsp);

    let vps_id = r.u(4, "sps_video_parameter_set_id")? as u8;
    let max_sub_layers_minus1 = r.u(3, "sps_max_sub_layers_minus1")? as u8;
    if max_sub_layers_minus1 > 6 {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "sps_max_sub_layers_minus1",
            value: max_sub_layers_minus1 as u64,
        });
    }
    r.flag("sps_temporal_id_nesting_flag")?;
    let profile = parse_profile_tier_level(&mut r, max_sub_layers_minus1)?;

    let sps_id = r.ue_max("sps_seq_parameter_set_id", 15)?;
    let chroma_format_idc = r.ue_max("chroma_format_idc", 3)?;
    let separate_colour_plane = if chroma_format_idc == 3 {
        r.flag("separate_colour_plane_flag")?
    } else {
        false
    };

    let width = r.ue_max("pic_width_in_luma_samples", MAX_DIMENSION)?;
    let height = r.ue_max("pic_height_in_luma_samples", MAX_DIMENSION)?;
    if width == 0 || height == 0 {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "pic_width_in_luma_samples",
            value: 0,
        });
    }

    let mut conformance_window = CropWindow::default();
    if r.flag("conformance_window_flag")? {
        let (sub_width, sub_height) = match (chroma_format_idc, separate_colour_plane) {
            (1, false) => (2, 2),
            (2, false) => (2, 1),
            _ => (1, 1),
        };
        let scale = |v: u32, unit: u64| (v as u64 * unit).min(u32::MAX as u64) as u32;
        conformance_window = CropWindow {
            left: scale(r.ue("conf_win_left_offset")?, sub_width),
            right: scale(r.ue("conf_win_right_offset")?, sub_width),
            top: scale(r.ue("conf_win_top_offset")?, sub_height),
            bottom: scale(r.ue("conf_win_bottom_offset")?, sub_height),
        };
        let crop_x = conformance_window.left as u64 + conformance_window.right as u64;
        let crop_y = conformance_window.top as u64 + conformance_window.bottom as u64;
        if crop_x >= width as u64 || crop_y >= height as u64 {
            return Err(BitstreamErrorKind::OutOfRange {
                field: "conf_win_offset",
                value: crop_x.max(crop_y),
            });
        }
    }

    let bit_depth_luma = r.ue_max("bit_depth_luma_minus8", 8)? as u8 + 8;
    let bit_depth_chroma = r.ue_max("bit_depth_chroma_minus8", 8)? as u8 + 8;
    let log2_max_pic_order_cnt_lsb = r.ue_max("log2_max_pic_order_cnt_lsb_minus4", 12)? + 4;

    let sub_layer_ordering_info_present = r.flag("sps_sub_layer_ordering_info_present_flag")?;
    let start = if sub_layer_ordering_info_present {
        0
    } else {
        max_sub_layers_minus1
    };
    for _ in start..=max_sub_layers_minus1 {
        r.ue("sps_max_dec_pic_buffering_minus1")?;
        r.ue("sps_max_num_reorder_pics")?;
        r.ue("sps_max_latency_increase_plus1")?;
    }

    let log2_min_cb_size = r.ue_max("log2_min_luma_coding_block_size_minus3", 3)? + 3;
    let log2_ctb_size = log2_min_cb_size + r.ue_max("log2_diff_max_min_luma_coding_block_size", 3)?;
    if log2_ctb_size > 6 {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "log2_diff_max_min_luma_coding_block_size",
            value: log2_ctb_size as u64,
        });
    }
    let min_cb = 1u32 << log2_min_cb_size;
    if width % min_cb != 0 {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "pic_width_in_luma_samples",
            value: width as u64,
        });
    }
    if height % min_cb != 0 {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "pic_height_in_luma_samples",
            value: height as u64,
        });
    }

    r.ue("log2_min_luma_transform_block_size_minus2")?;
    r.ue("log2_diff_max_min_luma_transform_block_size")?;
    r.ue("max_transform_hierarchy_depth_inter")?;
    r.ue("max_transform_hierarchy_depth_intra")?;

    if r.flag("scaling_list_enabled_flag")? && r.flag("sps_scaling_list_data_present_flag")? {
        skip_scaling_list_data(&mut r)?;
    }

    r.flag("amp_enabled_flag")?;
    r.flag("sample_adaptive_offset_enabled_flag")?;
    if r.flag("pcm_enabled_flag")? {
        r.u(4, "pcm_sample_bit_depth_luma_minus1")?;
        r.u(4, "pcm_sample_bit_depth_chroma_minus1")?;
        r.ue("log2_min_pcm_luma_coding_block_size_minus3")?;
        r.ue("log2_diff_max_min_pcm_luma_coding_block_size")?;
        r.flag("pcm_loop_filter_disabled_flag")?;
    }

    let num_short_term_ref_pic_sets = r.ue_max("num_short_term_ref_pic_sets", 64)?;
    let mut num_delta_pocs = Vec::with_capacity(num_short_term_ref_pic_sets as usize);
    for idx in 0..num_short_term_ref_pic_sets as usize {
        let count = skip_short_term_ref_pic_set(&mut r, idx, &num_delta_pocs)?;
        num_delta_pocs.push(count);
    }

    let long_term_ref_pics_present = r.flag("long_term_ref_pics_present_flag")?;
    if long_term_ref_pics_present {
        let count = r.ue_max("num_long_term_ref_pics_sps", 32)?;
        for _ in 0..count {
            r.u(log2_max_pic_order_cnt_lsb, "lt_ref_pic_poc_lsb_sps")?;
            r.flag("used_by_curr_pic_lt_sps_flag")?;
        }
    }

    let temporal_mvp_enabled = r.flag("sps_temporal_mvp_enabled_flag")?;
    r.flag("strong_intra_smoothing_enabled_flag")?;

    Ok(Sps {
        vps_id,
        max_sub_layers: max_sub_layers_minus1 + 1,
        profile,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        width,
        height,
        conformance_window,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_pic_order_cnt_lsb,
        log2_min_cb_size,
        log2_ctb_size,
        num_short_term_ref_pic_sets,
        long_term_ref_pics_present,
        temporal_mvp_enabled,
    })
}

/// Parse profile_tier_level structure
fn parse_profile_tier_level(
    r: &mut RbspReader<'_>,
    max_sub_layers_minus1: u8,
) -> ParseResult<ProfileTierLevel> {
    r.u(2, "general_profile_space")?;
    let tier = r.flag("general_tier_flag")?;
    let profile_idc = r.u(5, "general_profile_idc")? as u8;
    r.u(32, "general_profile_compatibility_flags")?;
    // progressive, interlaced, non_packed, frame_only + 44 reserved bits
    r.skip(48, "general_constraint_flags")?;
    let level_idc = r.u(8, "general_level_idc")? as u8;

    let mut profile_present = [false; 8];
    let mut level_present = [false; 8];
    for i in 0..max_sub_layers_minus1 as usize {
        profile_present[i] = r.flag("sub_layer_profile_present_flag")?;
        level_present[i] = r.flag("sub_layer_level_present_flag")?;
    }
    if max_sub_layers_minus1 > 0 {
        for _ in max_sub_layers_minus1..8 {
            r.u(2, "reserved_zero_2bits")?;
        }
    }
    for i in 0..max_sub_layers_minus1 as usize {
        if profile_present[i] {
            r.skip(88, "sub_layer_profile")?;
        }
        if level_present[i] {
            r.u(8, "sub_layer_level_idc")?;
        }
    }

    Ok(ProfileTierLevel {
        profile_idc,
        tier,
        level_idc,
    })
}

fn skip_scaling_list_data(r: &mut RbspReader<'_>) -> ParseResult<()> {
    for size_id in 0..4u32 {
        let step = if size_id == 3 { 3 } else { 1 };
        for _ in (0..6).step_by(step) {
            if !r.flag("scaling_list_pred_mode_flag")? {
                r.ue("scaling_list_pred_matrix_id_delta")?;
            } else {
                let coef_num = 64.min(1 << (4 + (size_id << 1)));
                if size_id > 1 {
                    r.se("scaling_list_dc_coef_minus8")?;
                }
                for _ in 0..coef_num {
                    r.se("scaling_list_delta_coef")?;
                }
            }
        }
    }
    Ok(())
}

/// Consume `st_ref_pic_set(idx)` from an SPS and return its `NumDeltaPocs`.
fn skip_short_term_ref_pic_set(
    r: &mut RbspReader<'_>,
    idx: usize,
    num_delta_pocs: &[u32],
) -> ParseResult<u32> {
    let inter_ref_pic_set_prediction = idx > 0 && r.flag("inter_ref_pic_set_prediction_flag")?;

    if inter_ref_pic_set_prediction {
        // In an SPS the reference set is always the previous one.
        let reference = num_delta_pocs[idx - 1];
        r.flag("delta_rps_sign")?;
        r.ue_max("abs_delta_rps_minus1", 32767)?;
        let mut count = 0;
        for _ in 0..=reference {
            let used = r.flag("used_by_curr_pic_flag")?;
            let use_delta = if used {
                true
            } else {
                r.flag("use_delta_flag")?
            };
            if use_delta {
                count += 1;
            }
        }
        return Ok(count);
    }

    let negative = r.ue_max("num_negative_pics", 16)?;
    let positive = r.ue_max("num_positive_pics", 16)?;
    for _ in 0..negative {
        r.ue("delta_poc_s0_minus1")?;
        r.flag("used_by_curr_pic_s0_flag")?;
    }
    for _ in 0..positive {
        r.ue("delta_poc_s1_minus1")?;
        r.flag("used_by_curr_pic_s1_flag")?;
    }
    Ok(negative + positive)
}
