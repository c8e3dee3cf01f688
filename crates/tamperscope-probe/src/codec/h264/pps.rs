//! H.264 Picture Parameter Set (PPS) parsing

use crate::codec::rbsp::{ceil_log2, ParseResult, RbspReader};
use crate::error::BitstreamErrorKind;

/// Picture Parameter Set, limited to the fields slice headers depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    pub pps_id: u32,
    pub sps_id: u32,
    /// CABAC when set, CAVLC otherwise.
    pub entropy_coding_mode: bool,
    pub bottom_field_pic_order_in_frame_present: bool,
    pub num_slice_groups: u32,
    pub num_ref_idx_l0_default_active: u32,
    pub num_ref_idx_l1_default_active: u32,
    pub weighted_pred: bool,
    pub weighted_bipred_idc: u32,
    pub deblocking_filter_control_present: bool,
    pub redundant_pic_cnt_present: bool,
}

pub fn parse_pps(rbsp: &[u8]) -> ParseResult<Pps> {
    let mut r = RbspReader::new(rbsp);

    let pps_id = r.ue_max("pic_parameter_set_id", 255)?;
    let sps_id = r.ue_max("seq_parameter_set_id", 31)?;
    let entropy_coding_mode = r.flag("entropy_coding_mode_flag")?;
    let bottom_field_pic_order_in_frame_present =
        r.flag("bottom_field_pic_order_in_frame_present_flag")?;
    let num_slice_groups = r.ue_max("num_slice_groups_minus1", 7)? + 1;

    if num_slice_groups > 1 {
        let map_type = r.ue_max("slice_group_map_type", 6)?;
        match map_type {
            0 => {
                for _ in 0..num_slice_groups {
                    r.ue("run_length_minus1")?;
                }
            }
            2 => {
                for _ in 0..num_slice_groups - 1 {
                    r.ue("top_left")?;
                    r.ue("bottom_right")?;
                }
            }
            3..=5 => {
                r.flag("slice_group_change_direction_flag")?;
                r.ue("slice_group_change_rate_minus1")?;
            }
            6 => {
                let map_units = r.ue("pic_size_in_map_units_minus1")? as u64 + 1;
                let bits = ceil_log2(num_slice_groups) as u64;
                r.skip(map_units * bits, "slice_group_id")?;
            }
            _ => {}
        }
    }

    let num_ref_idx_l0_default_active = r.ue_max("num_ref_idx_l0_default_active_minus1", 31)? + 1;
    let num_ref_idx_l1_default_active = r.ue_max("num_ref_idx_l1_default_active_minus1", 31)? + 1;
    let weighted_pred = r.flag("weighted_pred_flag")?;
    let weighted_bipred_idc = r.u(2, "weighted_bipred_idc")?;
    if weighted_bipred_idc == 3 {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "weighted_bipred_idc",
            value: 3,
        });
    }
    r.se("pic_init_qp_minus26")?;
    r.se("pic_init_qs_minus26")?;
    r.se("chroma_qp_index_offset")?;
    let deblocking_filter_control_present = r.flag("deblocking_filter_control_present_flag")?;
    r.flag("constrained_intra_pred_flag")?;
    let redundant_pic_cnt_present = r.flag("redundant_pic_cnt_present_flag")?;

    Ok(Pps {
        pps_id,
        sps_id,
        entropy_coding_mode,
        bottom_field_pic_order_in_frame_present,
        num_slice_groups,
        num_ref_idx_l0_default_active,
        num_ref_idx_l1_default_active,
        weighted_pred,
        weighted_bipred_idc,
        deblocking_filter_control_present,
        redundant_pic_cnt_present,
    })
}
