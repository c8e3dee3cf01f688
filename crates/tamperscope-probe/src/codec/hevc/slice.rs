//! HEVC slice segment header, up to `slice_pic_order_cnt_lsb`.

use super::{NalHeader, ParameterSets, Pps, Sps};
use crate::codec::rbsp::{ParseResult, RbspReader};
use crate::error::{BitstreamErrorKind, ParameterSetKind};
use crate::types::SliceType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    pub first_slice_segment_in_pic: bool,
    pub no_output_of_prior_pics: Option<bool>,
    pub pps_id: u32,
    pub sps_id: u32,
    pub dependent_slice_segment: bool,
    pub slice_segment_address: u32,
    /// Absent for dependent slice segments, which inherit it.
    pub slice_type: Option<SliceType>,
    pub pic_output: bool,
    /// Absent for IDR pictures.
    pub pic_order_cnt_lsb: Option<u32>,
}

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
    if !params.vps.is_empty() && !params.vps.contains(&sps.vps_id) {
        return Err(BitstreamErrorKind::UndefinedParameterSet {
            kind: ParameterSetKind::Vps,
            id: sps.vps_id as u32,
        });
    }
    Ok((pps, sps))
}

/// Parse the leading fields of a slice segment header. `rbsp` excludes the
/// two-byte NAL header.
pub fn parse_slice_header(
    rbsp: &[u8],
    header: NalHeader,
    params: &ParameterSets,
) -> ParseResult<SliceHeader> {
    let mut r = RbspReader::new(rbsp);

    let first_slice_segment_in_pic = r.flag("first_slice_segment_in_pic_flag")?;
    let no_output_of_prior_pics = if header.is_irap() {
        Some(r.flag("no_output_of_prior_pics_flag")?)
    } else {
        None
    };
    let pps_id = r.ue_max("slice_pic_parameter_set_id", 63)?;
    let (pps, sps) = lookup(params, pps_id)?;

    let mut dependent_slice_segment = false;
    let mut slice_segment_address = 0;
    if !first_slice_segment_in_pic {
        if pps.dependent_slice_segments_enabled {
            dependent_slice_segment = r.flag("dependent_slice_segment_flag")?;
        }
        slice_segment_address = r.u(sps.slice_address_bits(), "slice_segment_address")?;
        if slice_segment_address >= sps.pic_size_in_ctbs() {
            return Err(BitstreamErrorKind::OutOfRange {
                field: "slice_segment_address",
                value: slice_segment_address as u64,
            });
        }
    }

    let mut slice_type = None;
    let mut pic_output = true;
    let mut pic_order_cnt_lsb = None;
    if !dependent_slice_segment {
        r.skip(pps.num_extra_slice_header_bits as u64, "slice_reserved_flag")?;
        slice_type = Some(match r.ue_max("slice_type", 2)? {
            0 => SliceType::B,
            1 => SliceType::P,
            _ => SliceType::I,
        });
        if pps.output_flag_present {
            pic_output = r.flag("pic_output_flag")?;
        }
        if sps.separate_colour_plane {
            r.u(2, "colour_plane_id")?;
        }
        if !header.is_idr() {
            pic_order_cnt_lsb =
                Some(r.u(sps.log2_max_pic_order_cnt_lsb, "slice_pic_order_cnt_lsb")?);
        }
    }

    if header.is_irap() && slice_type.is_some_and(|t| t != SliceType::I) {
        return Err(BitstreamErrorKind::OutOfRange {
            field: "slice_type",
            value: 1,
        });
    }

    Ok(SliceHeader {
        first_slice_segment_in_pic,
        no_output_of_prior_pics,
        pps_id,
        sps_id: sps.sps_id,
        dependent_slice_segment,
        slice_segment_address,
        slice_type,
        pic_output,
        pic_order_cnt_lsb,
    })
}

/// `first_slice_segment_in_pic_flag`, read without resolving parameter sets.
pub(crate) fn starts_picture(rbsp: &[u8]) -> bool {
    rbsp.first().is_some_and(|b| b & 0x80 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::hevc::{parse_pps, parse_sps, parse_vps_id};
    use crate::codec::rbsp::remove_emulation_prevention;
    use crate::synth::HevcStream;

    fn params_for(stream: &HevcStream) -> ParameterSets {
        let mut params = ParameterSets::default();
        let vps = parse_vps_id(&remove_emulation_prevention(&stream.vps()[2..])).unwrap();
        let sps = parse_sps(&remove_emulation_prevention(&stream.sps()[2..])).unwrap();
        let pps = parse_pps(&remove_emulation_prevention(&stream.pps()[2..])).unwrap();
        params.vps.insert(vps);
        params.sps.insert(sps.sps_id, sps);
        params.pps.insert(pps.pps_id, pps);
        params
    }

    fn parse(nal: &[u8], params: &ParameterSets) -> ParseResult<SliceHeader> {
        let header = NalHeader::parse(nal).unwrap();
        parse_slice_header(&remove_emulation_prevention(&nal[2..]), header, params)
    }

    #[test]
    fn test_idr_has_no_poc() {
        let stream = HevcStream::new(1920, 1080);
        let params = params_for(&stream);
        let slice = parse(&stream.slice(19, 0), &params).unwrap();
        assert!(slice.first_slice_segment_in_pic);
        assert_eq!(slice.no_output_of_prior_pics, Some(false));
        assert_eq!(slice.slice_type, Some(SliceType::I));
        assert_eq!(slice.pic_order_cnt_lsb, None);
    }

    #[test]
    fn test_cra_poc_lsb() {
        let stream = HevcStream::new(1920, 1080);
        let params = params_for(&stream);
        let slice = parse(&stream.slice(21, 12), &params).unwrap();
        assert_eq!(slice.slice_type, Some(SliceType::I));
        assert_eq!(slice.pic_order_cnt_lsb, Some(12));
    }

    #[test]
    fn test_trailing_picture() {
        let stream = HevcStream::new(1280, 720);
        let params = params_for(&stream);
        let slice = parse(&stream.slice(1, 4), &params).unwrap();
        assert_eq!(slice.slice_type, Some(SliceType::P));
        assert_eq!(slice.no_output_of_prior_pics, None);
        assert_eq!(slice.pic_order_cnt_lsb, Some(4));
    }

    #[test]
    fn test_missing_vps() {
        let stream = HevcStream::new(1280, 720);
        let mut params = params_for(&stream);
        params.vps.clear();
        params.vps.insert(3);
        assert_eq!(
            parse(&stream.slice(19, 0), &params),
            Err(BitstreamErrorKind::UndefinedParameterSet {
                kind: ParameterSetKind::Vps,
                id: 0
            })
        );
    }
}
