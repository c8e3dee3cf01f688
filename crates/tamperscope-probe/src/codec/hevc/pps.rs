//! HEVC Picture Parameter Set (PPS) parsing

use crate::codec::rbsp::{ParseResult, RbspReader};

/// Picture Parameter Set, limited to the fields slice headers depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    pub pps_id: u32,
    pub sps_id: u32,
    pub dependent_slice_segments_enabled: bool,
    pub output_flag_present: bool,
    pub num_extra_slice_header_bits: u32,
    pub cabac_init_present: bool,
    pub tiles_enabled: bool,
    pub entropy_coding_sync_enabled: bool,
}

pub fn parse_pps(rbsp: &[u8]) -> ParseResult<Pps> {
    let mut r = RbspReader::new(rbsp);

    let pps_id = r.ue_max("pps_pic_parameter_set_id", 63)?;
    let sps_id = r.ue_max("pps_seq_parameter_set_id", 15)?;
    let dependent_slice_segments_enabled = r.flag("dependent_slice_segments_enabled_flag")?;
    let output_flag_present = r.flag("output_flag_present_flag")?;
    let num_extra_slice_header_bits = r.u(3, "num_extra_slice_header_bits")?;
    r.flag("sign_data_hiding_enabled_flag")?;
    let cabac_init_present = r.flag("cabac_init_present_flag")?;
    r.ue_max("num_ref_idx_l0_default_active_minus1", 14)?;
    r.ue_max("num_ref_idx_l1_default_active_minus1", 14)?;
    r.se("init_qp_minus26")?;
    r.flag("constrained_intra_pred_flag")?;
    r.flag("transform_skip_enabled_flag")?;
    if r.flag("cu_qp_delta_enabled_flag")? {
        r.ue("diff_cu_qp_delta_depth")?;
    }
    r.se("pps_cb_qp_offset")?;
    r.se("pps_cr_qp_offset")?;
    r.flag("pps_slice_chroma_qp_offsets_present_flag")?;
    r.flag("weighted_pred_flag")?;
    r.flag("weighted_bipred_flag")?;
    r.flag("transquant_bypass_enabled_flag")?;
    let tiles_enabled = r.flag("tiles_enabled_flag")?;
    let entropy_coding_sync_enabled = r.flag("entropy_coding_sync_enabled_flag")?;
    if tiles_enabled {
        let columns = r.ue_max("num_tile_columns_minus1", 19)?;
        let rows = r.ue_max("num_tile_rows_minus1", 21)?;
        if !r.flag("uniform_spacing_flag")? {
            for _ in 0..columns {
                r.ue("column_width_minus1")?;
            }
            for _ in 0..rows {
                r.ue("row_height_minus1")?;
            }
        }
        r.flag("loop_filter_across_tiles_enabled_flag")?;
    }
    r.flag("pps_loop_filter_across_slices_enabled_flag")?;

    Ok(Pps {
        pps_id,
        sps_id,
        dependent_slice_segments_enabled,
        output_flag_present,
        num_extra_slice_header_bits,
        cabac_init_present,
        tiles_enabled,
        entropy_coding_sync_enabled,
    })
}
