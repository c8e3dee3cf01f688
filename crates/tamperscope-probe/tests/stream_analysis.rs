//! Integration tests for tamperscope-probe

use tamperscope_probe::codec::nal::{split, split_annex_b};
use tamperscope_probe::synth::{self, AvcStream, HevcStream};
use tamperscope_probe::{
    BitstreamErrorKind, Codec, DecoderConfig, Dimensions, NalClass, NalFormat, StreamAnalyzer,
};

#[test]
fn test_avc_gop_in_length_prefixed_samples() {
    let stream = AvcStream::new(1280, 720);
    let config = DecoderConfig::parse(Codec::H264, &stream.avcc()).unwrap();
    let (mut analyzer, errors) = StreamAnalyzer::from_config(&config, 500);
    assert!(errors.is_empty());

    let mut offset = 10_000;
    for frame in 0..8u32 {
        let unit = stream.slice(frame == 0, frame, frame * 2);
        let sample = synth::length_prefixed(&[unit], config.nal_length_size);
        let analysis = analyzer.analyze_sample(&sample, offset);
        let picture = analysis.picture.as_ref().unwrap();

        assert!(analysis.is_decodable(), "frame {frame}");
        assert_eq!(picture.is_sync, frame == 0);
        assert_eq!(picture.frame_num, Some(frame));
        assert_eq!(picture.starts_mid_sequence(), frame != 0);
        assert_eq!(analysis.units[0].offset, offset + 4);
        offset += sample.len() as u64;
    }
}

#[test]
fn test_hevc_conformance_window() {
    let stream = HevcStream::new(1918, 1078);
    let mut analyzer = StreamAnalyzer::new(Codec::Hevc, NalFormat::LengthPrefixed(4));
    let sample = synth::length_prefixed(
        &[stream.vps(), stream.sps(), stream.pps(), stream.slice(20, 0)],
        4,
    );
    let analysis = analyzer.analyze_sample(&sample, 0);
    assert!(analysis.is_decodable());

    let sequence = analyzer.primary_sequence().unwrap();
    assert_eq!(sequence.coded, Dimensions::new(1920, 1080));
    assert_eq!(sequence.cropped, Dimensions::new(1918, 1078));
    assert!(!sequence.crops_beyond_alignment());
    assert_eq!(
        analysis
            .units
            .iter()
            .filter(|u| u.class == NalClass::ParameterSet)
            .count(),
        3
    );
}

#[test]
fn test_recovery_point_open_gop() {
    let stream = AvcStream::new(640, 480);
    let config = DecoderConfig::parse(Codec::H264, &stream.avcc()).unwrap();
    let (mut analyzer, _) = StreamAnalyzer::from_config(&config, 0);
    let sample = synth::length_prefixed(
        &[synth::sei_recovery_point(Codec::H264, 0), stream.slice(false, 0, 0)],
        4,
    );
    let analysis = analyzer.analyze_sample(&sample, 0);
    let recovery = analysis.recovery_point.unwrap();
    assert_eq!(recovery.count, 0);
    assert!(recovery.exact_match);
    assert!(!analysis.picture.unwrap().is_sync);
}

#[test]
fn test_reframe_to_annex_b() {
    let stream = AvcStream::new(640, 480);
    let config = DecoderConfig::parse(Codec::H264, &stream.avcc()).unwrap();
    let (analyzer, _) = StreamAnalyzer::from_config(&config, 0);

    let slice = stream.slice(true, 0, 0);
    let sample = synth::length_prefixed(std::slice::from_ref(&slice), 4);
    let units: Vec<Vec<u8>> = split(&sample, analyzer.format())
        .units
        .iter()
        .map(|r| r.slice(&sample).to_vec())
        .collect();

    let mut elementary: Vec<Vec<u8>> = analyzer
        .parameter_set_nals()
        .into_iter()
        .map(|u| u.to_vec())
        .collect();
    elementary.extend(units);
    let annex_b = synth::annex_b(&elementary);

    assert_eq!(split_annex_b(&annex_b).units.len(), 3);
    let mut reader = analyzer.with_format(NalFormat::AnnexB);
    let analysis = reader.analyze_sample(&annex_b, 0);
    assert!(analysis.is_decodable());
    assert_eq!(analysis.dimensions(), Some(Dimensions::new(640, 480)));
}

#[test]
fn test_garbage_is_not_decodable() {
    let mut analyzer = StreamAnalyzer::new(Codec::H264, NalFormat::LengthPrefixed(4));
    let garbage: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(97)).collect();
    let analysis = analyzer.analyze_sample(&garbage, 0);
    assert!(!analysis.is_decodable());
    assert!(analysis
        .errors
        .iter()
        .any(|e| matches!(e.kind, BitstreamErrorKind::LengthOverrun { .. })));
}
