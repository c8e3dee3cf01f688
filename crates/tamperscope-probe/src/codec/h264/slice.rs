//! H.264 slice header, up to the picture order count fields.

use super::{NalHeader, ParameterSets, Pps, Sps};
use crate::codec::rbsp::{ParseResult, RbspReader};
use crate::error::{BitstreamErrorKind, ParameterSetKind};
use crate::types::SliceType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: SliceType,
    /// `slice_type` values 5..=9 declare every slice of the picture has this type.
    pub all_slices_same_type: bool,
    pub pps_id: u32,
    pub sps_id: u32,
    pub frame_num: u32,
    pub field_pic: bool,
    pub bottom_field: bool,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_lsb: Option<u32>,
    pub delta_pic_order_cnt_bottom: Option<i32>,
}

/// Resolve the PPS and SPS a slice refers to.
pub(crate) fn lookup<'a>(
    params: &'a ParameterSets,
    pps_id: u32,
) -> ParseResult<(&'a Pps, &'a Sps)> {
    let pps = params
        .pps
        .get(&pps_id)
        .ok_or(BitstreamErrorKind::UndefinedParameterSet {
            kind: ParameterSetKind::Pps,
            id: pps_id,
        })?;
    let sps = params
        .sps
        .get(&pps.sps_id)
        .ok_or(BitstreamErrorKind::UndefinedParameterSet {
            kind: ParameterSetKind::Sps,
            id: pps.sps_id,
        })?;
    Ok((pps, sps))
}

/// Parse the leading fields of a slice header. `rbsp` excludes the NAL header.
pub fn parse_slice_header(
    rbsp: &[u8],
    header: NalHeader,
    params: &ParameterSets,
) -> ParseResult<SliceHeader> {
    let mut r = RbspReader::new(rbsp);

    let first_mb_in_slice = r.ue("first_mb_in_slice")?;
    let raw_type = r.ue_max("slice_type", 9)?;
    let slice_type = match raw_type % 5 {
        0 => SliceType::P,
        1 => SliceType::B,
        2 => SliceType::I,
        3 => SliceType::Sp,
        _ => SliceType::Si,
    };
    let pps_id = r.ue_max("pic_parameter_set_id", 255)?;
    let (pps, sps) = lookup(params, pps_id)?;

    if sps.separate_colour_plane {
        r.u(2, "colour_plane_id")?;
    }
    let frame_num = r.u(sps.log2_max_frame_num, "frame_num")?;

    let mut field_pic = false;
    let mut bottom_field = false;
    if !sps.frame_mbs_only {
        field_pic = r.flag("field_pic_flag")?;
        if field_pic {
            bottom_field = r.flag("bottom_field_flag")?;
        }
    }

    let idr_pic_id = if header.is_idr() {
        Some(r.ue_max("idr_pic_id", 65535)?)
    } else {
        None
    };

    let mut pic_order_cnt_lsb = None;
    let mut delta_pic_order_cnt_bottom = None;
    if sps.pic_order_cnt_type == 0 {
        pic_order_cnt_lsb = Some(r.u(sps.log2_max_pic_order_cnt_lsb, "pic_order_cnt_lsb")?);
        if pps.bottom_field_pic_order_in_frame_present && !field_pic {
            delta_pic_order_cnt_bottom = Some(r.se("delta_pic_order_cnt_bottom")?);
        }
    }

    if header.is_idr() && !matches!(slice_type, SliceType::I | SliceType::Si) {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "slice_type",
            value: raw_type as u64,
        });
    }

    Ok(SliceHeader {
        first_mb_in_slice,
        slice_type,
        all_slices_same_type: raw_type >= 5,
        pps_id,
        sps_id: sps.sps_id,
        frame_num,
        field_pic,
        bottom_field,
        idr_pic_id,
        pic_order_cnt_lsb,
        delta_pic_order_cnt_bottom,
    })
}

/// `first_mb_in_slice == 0`, read without resolving parameter sets.
pub(crate) fn starts_picture(rbsp: &[u8]) -> bool {
    RbspReader::new(rbsp)
        .ue("first_mb_in_slice")
        .map(|mb| mb == 0)
        .unwrap_or(false)
}
