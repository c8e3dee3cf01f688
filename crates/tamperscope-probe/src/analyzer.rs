//! Per-track bitstream analysis.
//!
//! A [`StreamAnalyzer`] holds the parameter sets of one video track and
//! reads samples (or recovered candidates) against them. Errors never stop
//! the analyzer: they are collected on the [`SampleAnalysis`] together with
//! whatever could still be read.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::codec::nal::{self, NalFormat, NalRange};
use crate::codec::rbsp::remove_emulation_prevention;
use crate::codec::sei::{parse_sei, SeiMessage};
use crate::codec::{h264, hevc, unit_header};
use crate::config::DecoderConfig;
use crate::error::{BitstreamError, BitstreamErrorKind, Result};
use crate::types::{
    BitstreamUnit, Codec, Dimensions, DisplayOrientation, NalClass, PictureInfo, RecoveryPoint,
    SequenceInfo,
};

#[derive(Debug, Clone)]
enum CodecParams {
    H264(h264::ParameterSets),
    Hevc(hevc::ParameterSets),
}

/// What one sample or candidate range contains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleAnalysis {
    pub units: Vec<BitstreamUnit>,
    /// First slice of the first picture, if its header parsed.
    pub picture: Option<PictureInfo>,
    pub slice_count: usize,
    pub orientation: Option<DisplayOrientation>,
    pub recovery_point: Option<RecoveryPoint>,
    pub errors: Vec<BitstreamError>,
    /// The data ends inside a unit or its length prefix.
    pub truncated: bool,
}

impl SampleAnalysis {
    /// A complete picture with no bitstream errors.
    pub fn is_decodable(&self) -> bool {
        self.picture.is_some() && self.errors.is_empty() && !self.truncated
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.picture.as_ref().map(|p| p.dimensions())
    }
}

/// Parameter-set state for one track's bitstream.
#[derive(Debug, Clone)]
pub struct StreamAnalyzer {
    codec: Codec,
    format: NalFormat,
    params: CodecParams,
    /// Raw parameter set units keyed by (nal type, id).
    raw: BTreeMap<(u8, u32), Vec<u8>>,
}

impl StreamAnalyzer {
    pub fn new(codec: Codec, format: NalFormat) -> Self {
        let params = match codec {
            Codec::H264 => CodecParams::H264(h264::ParameterSets::default()),
            Codec::Hevc => CodecParams::Hevc(hevc::ParameterSets::default()),
        };
        Self {
            codec,
            format,
            params,
            raw: BTreeMap::new(),
        }
    }

    /// Seed an analyzer from a decoder configuration record located at
    /// `offset`. Parameter sets that fail to parse are returned as errors;
    /// the rest are kept.
    pub fn from_config(config: &DecoderConfig, offset: u64) -> (Self, Vec<BitstreamError>) {
        let mut analyzer = Self::new(config.codec, NalFormat::LengthPrefixed(config.nal_length_size));
        let mut errors = Vec::new();
        for unit in &config.parameter_sets {
            if let Err(e) = analyzer.add_parameter_set(unit, offset) {
                errors.push(e);
            }
        }
        (analyzer, errors)
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn format(&self) -> NalFormat {
        self.format
    }

    /// Same parameter sets, different framing.
    pub fn with_format(&self, format: NalFormat) -> Self {
        Self {
            format,
            ..self.clone()
        }
    }

    /// Parse and store a VPS, SPS or PPS unit. Returns the cropped
    /// dimensions when the unit is an SPS.
    pub fn add_parameter_set(&mut self, unit: &[u8], offset: u64) -> Result<Option<Dimensions>> {
        let header = unit_header(self.codec, unit).map_err(|k| k.at(offset))?;
        let rbsp = remove_emulation_prevention(&unit[self.codec.nal_header_size()..]);
        let stored = match &mut self.params {
            CodecParams::H264(params) => match header.nal_type {
                h264::NAL_SPS => {
                    let sps = h264::parse_sps(&rbsp).map_err(|k| k.at(offset))?;
                    let dims = sps.cropped_dimensions();
                    let id = sps.sps_id;
                    params.sps.insert(id, sps);
                    Some((id, Some(dims)))
                }
                h264::NAL_PPS => {
                    let pps = h264::parse_pps(&rbsp).map_err(|k| k.at(offset))?;
                    let id = pps.pps_id;
                    params.pps.insert(id, pps);
                    Some((id, None))
                }
                _ => None,
            },
            CodecParams::Hevc(params) => match header.nal_type {
                hevc::NAL_VPS => {
                    let id = hevc::parse_vps_id(&rbsp).map_err(|k| k.at(offset))?;
                    params.vps.insert(id);
                    Some((id as u32, None))
                }
                hevc::NAL_SPS => {
                    let sps = hevc::parse_sps(&rbsp).map_err(|k| k.at(offset))?;
                    let dims = sps.cropped_dimensions();
                    let id = sps.sps_id;
                    params.sps.insert(id, sps);
                    Some((id, Some(dims)))
                }
                hevc::NAL_PPS => {
                    let pps = hevc::parse_pps(&rbsp).map_err(|k| k.at(offset))?;
                    let id = pps.pps_id;
                    params.pps.insert(id, pps);
                    Some((id, None))
                }
                _ => None,
            },
        };

        match stored {
            Some((id, dims)) => {
                self.raw.insert((header.nal_type, id), unit.to_vec());
                Ok(dims)
            }
            None => Err(BitstreamErrorKind::Unsupported("parameter set type").at(offset)),
        }
    }

    /// Stored parameter set units in VPS, SPS, PPS order.
    pub fn parameter_set_nals(&self) -> Vec<&[u8]> {
        self.raw.values().map(|v| v.as_slice()).collect()
    }

    pub fn has_parameter_sets(&self) -> bool {
        match &self.params {
            CodecParams::H264(p) => !p.sps.is_empty() && !p.pps.is_empty(),
            CodecParams::Hevc(p) => !p.sps.is_empty() && !p.pps.is_empty(),
        }
    }

    /// Sequence info of the lowest-numbered SPS.
    pub fn primary_sequence(&self) -> Option<SequenceInfo> {
        match &self.params {
            CodecParams::H264(p) => p.sps.values().next().map(|s| s.sequence_info()),
            CodecParams::Hevc(p) => p.sps.values().next().map(|s| s.sequence_info()),
        }
    }

    /// Analyze one sample's bytes; `offset` is the sample's file offset.
    pub fn analyze_sample(&mut self, data: &[u8], offset: u64) -> SampleAnalysis {
        let split = nal::split(data, self.format);
        let mut analysis = self.analyze_units(data, &split.units, offset);
        analysis.truncated = split.is_truncated();
        if let Some((pos, kind)) = split.error {
            analysis.errors.push(kind.at(offset + pos as u64));
        }
        analysis
    }

    /// Analyze already-framed units of `data`.
    pub fn analyze_units(&mut self, data: &[u8], units: &[NalRange], offset: u64) -> SampleAnalysis {
        let mut analysis = SampleAnalysis::default();
        for range in units {
            self.analyze_unit(range.slice(data), offset + range.start as u64, &mut analysis);
        }
        trace!(
            offset,
            units = analysis.units.len(),
            errors = analysis.errors.len(),
            "analyzed sample"
        );
        analysis
    }

    fn analyze_unit(&mut self, unit: &[u8], offset: u64, analysis: &mut SampleAnalysis) {
        let header = match unit_header(self.codec, unit) {
            Ok(h) => h,
            Err(kind) => {
                analysis.errors.push(kind.at(offset));
                return;
            }
        };

        let mut record = BitstreamUnit {
            nal_type: header.nal_type,
            class: header.class,
            offset,
            length: unit.len() as u64,
            is_reference: header.is_reference,
            dimensions: None,
        };

        match header.class {
            NalClass::ParameterSet => match self.add_parameter_set(unit, offset) {
                Ok(dims) => record.dimensions = dims,
                // Extension parameter sets are not modelled.
                Err(BitstreamError {
                    kind: BitstreamErrorKind::Unsupported(_),
                    ..
                }) => {}
                Err(e) => analysis.errors.push(e),
            },
            NalClass::Sei => {
                let rbsp = remove_emulation_prevention(&unit[self.codec.nal_header_size()..]);
                match parse_sei(&rbsp, self.codec) {
                    Ok(messages) => {
                        for message in messages {
                            match message {
                                SeiMessage::DisplayOrientation(o) => {
                                    analysis.orientation.get_or_insert(o);
                                }
                                SeiMessage::RecoveryPoint(p) => {
                                    analysis.recovery_point.get_or_insert(p);
                                }
                                SeiMessage::Other(_) => {}
                            }
                        }
                    }
                    Err(kind) => analysis.errors.push(kind.at(offset)),
                }
            }
            NalClass::Slice => match self.parse_picture(unit, header.is_sync) {
                Ok(Some(picture)) => {
                    analysis.slice_count += 1;
                    if analysis.picture.is_none() {
                        analysis.picture = Some(picture);
                    }
                }
                Ok(None) => analysis.slice_count += 1,
                Err(kind) => analysis.errors.push(kind.at(offset)),
            },
            NalClass::Other => {}
        }

        analysis.units.push(record);
    }

    /// Slice header facts, or `None` for slice data without a header.
    fn parse_picture(
        &self,
        unit: &[u8],
        is_sync: bool,
    ) -> std::result::Result<Option<PictureInfo>, BitstreamErrorKind> {
        let rbsp = remove_emulation_prevention(&unit[self.codec.nal_header_size()..]);
        match &self.params {
            CodecParams::H264(params) => {
                let header = h264::NalHeader::parse(unit)?;
                if !header.has_slice_header() {
                    return Ok(None);
                }
                let slice = h264::parse_slice_header(&rbsp, header, params)?;
                let sps = params
                    .sps
                    .get(&slice.sps_id)
                    .ok_or(BitstreamErrorKind::Unsupported("SPS replaced mid-sample"))?;
                Ok(Some(PictureInfo {
                    codec: Codec::H264,
                    nal_type: header.nal_type,
                    slice_type: slice.slice_type,
                    is_sync,
                    is_reference: header.nal_ref_idc != 0,
                    pps_id: slice.pps_id,
                    sps_id: slice.sps_id,
                    first_slice: slice.first_mb_in_slice == 0,
                    frame_num: Some(slice.frame_num),
                    pic_order_cnt_type: Some(sps.pic_order_cnt_type),
                    pic_order_cnt_lsb: slice.pic_order_cnt_lsb,
                    sequence: sps.sequence_info(),
                }))
            }
            CodecParams::Hevc(params) => {
                let header = hevc::NalHeader::parse(unit)?;
                let slice = hevc::parse_slice_header(&rbsp, header, params)?;
                let Some(slice_type) = slice.slice_type else {
                    return Ok(None);
                };
                let sps = params
                    .sps
                    .get(&slice.sps_id)
                    .ok_or(BitstreamErrorKind::Unsupported("SPS replaced mid-sample"))?;
                Ok(Some(PictureInfo {
                    codec: Codec::Hevc,
                    nal_type: header.nal_type,
                    slice_type,
                    is_sync,
                    is_reference: header.is_reference(),
                    pps_id: slice.pps_id,
                    sps_id: slice.sps_id,
                    first_slice: slice.first_slice_segment_in_pic,
                    frame_num: None,
                    pic_order_cnt_type: None,
                    pic_order_cnt_lsb: slice.pic_order_cnt_lsb,
                    sequence: sps.sequence_info(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParameterSetKind;
    use crate::synth::{self, AvcStream, HevcStream};
    use crate::types::SliceType;

    fn avc_analyzer(stream: &AvcStream) -> StreamAnalyzer {
        let config = DecoderConfig::parse(Codec::H264, &stream.avcc()).unwrap();
        let (analyzer, errors) = StreamAnalyzer::from_config(&config, 0);
        assert!(errors.is_empty());
        analyzer
    }

    #[test]
    fn test_idr_sample() {
        let stream = AvcStream::new(1920, 1080);
        let mut analyzer = avc_analyzer(&stream);
        let sample = synth::length_prefixed(&[stream.slice(true, 0, 0)], 4);
        let analysis = analyzer.analyze_sample(&sample, 1000);

        assert!(analysis.is_decodable());
        let picture = analysis.picture.as_ref().unwrap();
        assert!(picture.is_sync);
        assert_eq!(picture.slice_type, SliceType::I);
        assert_eq!(analysis.dimensions(), Some(Dimensions::new(1920, 1080)));
        assert_eq!(analysis.units[0].offset, 1004);
        assert!(!picture.starts_mid_sequence());
    }

    #[test]
    fn test_in_band_parameter_sets() {
        let stream = AvcStream::new(1280, 720);
        let mut analyzer = StreamAnalyzer::new(Codec::H264, NalFormat::LengthPrefixed(4));
        let sample = synth::length_prefixed(
            &[stream.sps(), stream.pps(), stream.slice(true, 0, 0)],
            4,
        );
        let analysis = analyzer.analyze_sample(&sample, 0);
        assert!(analysis.is_decodable());
        assert_eq!(analysis.units[0].class, NalClass::ParameterSet);
        assert_eq!(analysis.units[0].dimensions, Some(Dimensions::new(1280, 720)));
        assert!(analyzer.has_parameter_sets());
        assert_eq!(analyzer.parameter_set_nals().len(), 2);
    }

    #[test]
    fn test_missing_parameter_sets() {
        let stream = AvcStream::new(1280, 720);
        let mut analyzer = StreamAnalyzer::new(Codec::H264, NalFormat::LengthPrefixed(4));
        let sample = synth::length_prefixed(&[stream.slice(true, 0, 0)], 4);
        let analysis = analyzer.analyze_sample(&sample, 64);
        assert!(!analysis.is_decodable());
        assert_eq!(
            analysis.errors,
            vec![BitstreamErrorKind::UndefinedParameterSet {
                kind: ParameterSetKind::Pps,
                id: 0
            }
            .at(68)]
        );
    }

    #[test]
    fn test_truncated_sample() {
        let stream = AvcStream::new(1280, 720);
        let mut analyzer = avc_analyzer(&stream);
        let sample = synth::length_prefixed(&[stream.slice(false, 1, 2)], 4);
        let analysis = analyzer.analyze_sample(&sample[..sample.len() - 3], 0);
        assert!(analysis.truncated);
        assert!(!analysis.is_decodable());
    }

    #[test]
    fn test_mid_sequence_start() {
        let stream = AvcStream::new(1280, 720);
        let mut analyzer = avc_analyzer(&stream);
        let sample = synth::length_prefixed(&[stream.slice(false, 4, 8)], 4);
        let analysis = analyzer.analyze_sample(&sample, 0);
        assert!(analysis.picture.unwrap().starts_mid_sequence());
    }

    #[test]
    fn test_hevc_with_orientation_sei() {
        let stream = HevcStream::new(1920, 1080);
        let config = DecoderConfig::parse(Codec::Hevc, &stream.hvcc()).unwrap();
        let (mut analyzer, errors) = StreamAnalyzer::from_config(&config, 0);
        assert!(errors.is_empty());

        let orientation = DisplayOrientation {
            cancel: false,
            horizontal_flip: false,
            vertical_flip: false,
            anticlockwise_rotation: 0xC000,
        };
        let sample = synth::length_prefixed(
            &[
                synth::sei_display_orientation(Codec::Hevc, orientation),
                stream.slice(19, 0),
            ],
            4,
        );
        let analysis = analyzer.analyze_sample(&sample, 0);
        assert!(analysis.is_decodable());
        assert_eq!(analysis.orientation, Some(orientation));
        assert_eq!(analysis.orientation.unwrap().clockwise_degrees(), 90);
        assert_eq!(analysis.units.len(), 2);
    }

    #[test]
    fn test_annex_b_format() {
        let stream = HevcStream::new(1280, 720);
        let mut analyzer = StreamAnalyzer::new(Codec::Hevc, NalFormat::AnnexB);
        let data = synth::annex_b(&[stream.vps(), stream.sps(), stream.pps(), stream.slice(1, 3)]);
        let analysis = analyzer.analyze_sample(&data, 0);
        assert!(analysis.is_decodable());
        let picture = analysis.picture.unwrap();
        assert_eq!(picture.pic_order_cnt_lsb, Some(3));
        assert!(picture.starts_mid_sequence());
    }
}
