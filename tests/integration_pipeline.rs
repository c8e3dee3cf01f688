//! End-to-end tests of the file pipeline: box tree, checks, recovery,
//! report and extraction.

mod common;

use std::io::Cursor;
use std::path::PathBuf;

use assert_matches::assert_matches;
use common::*;
use tamperscope::analysis::{analyze_file, analyze_source, FileAnalysis};
use tamperscope::extract::write_frames;
use tamperscope_forensics::{AnomalyKind, ForensicOptions, FrameStatus};
use tamperscope_media::mp4::{BoxReader, EditEntry, HandlerType, Movie, TransformMatrix};
use tamperscope_media::synth::{Mp4Builder, TrackSpec};
use tamperscope_media::StructuralErrorKind;
use tamperscope_probe::synth::{AvcStream, HevcStream};
use tamperscope_probe::{Codec, Dimensions};

fn run(data: &[u8]) -> FileAnalysis {
    analyze_source(
        Cursor::new(data.to_vec()),
        PathBuf::from("fixture.mp4"),
        &ForensicOptions::default(),
    )
    .unwrap()
}

fn kinds(analysis: &FileAnalysis) -> Vec<AnomalyKind> {
    analysis.report.anomalies.iter().map(|a| a.kind).collect()
}

#[test]
fn test_untouched_avc_has_no_findings() {
    let analysis = run(&untouched_avc());
    let report = &analysis.report;

    assert!(report.is_clean(), "{:#?}", report.anomalies);
    assert!(report.recovery.frames.is_empty());
    assert!(analysis.streams.is_empty());

    assert_eq!(report.tracks.len(), 1);
    let track = &report.tracks[0];
    assert_eq!(track.handler, HandlerType::Video);
    assert_eq!(track.codec, Some(Codec::H264));
    assert_eq!(track.sample_count, 30);
    assert_eq!(track.sync_sample_count, 3);
    assert!(track.hidden_samples.is_empty());
    assert_eq!(track.declared.track, Dimensions::new(640, 360));
    let derived = track.derived.as_ref().unwrap();
    assert_eq!(derived.coded, Dimensions::new(640, 368));
    assert_eq!(derived.cropped, Dimensions::new(640, 360));
}

#[test]
fn test_untouched_video_with_longer_audio_has_no_findings() {
    let analysis = run(&untouched_avc_with_audio());
    let report = &analysis.report;

    assert!(report.is_clean(), "{:#?}", report.anomalies);
    assert!(report.recovery.gaps.is_empty());
    assert_eq!(report.tracks.len(), 2);
    assert_eq!(report.tracks[1].handler, HandlerType::Audio);
    assert_eq!(report.tracks[1].sample_count, 65);
    let movie = report.movie.as_ref().unwrap();
    assert!(movie.duration > report.tracks[0].track_duration);
}

#[test]
fn test_untouched_hevc_has_no_findings() {
    let stream = HevcStream::new(640, 360);
    let data = Mp4Builder::new(MOVIE_TIMESCALE)
        .track(hevc_track(&stream, 0..20))
        .build();
    let analysis = run(&data);

    assert!(analysis.report.is_clean(), "{:#?}", analysis.report.anomalies);
    assert!(analysis.report.recovery.frames.is_empty());
    assert_eq!(analysis.report.tracks[0].codec, Some(Codec::Hevc));
}

#[test]
fn test_root_boxes_tile_the_file() {
    let data = avc_with_leftover_frames(2);
    let report = run(&data).report;

    let total: u64 = report.boxes.iter().map(|b| b.size).sum();
    assert_eq!(total, data.len() as u64);
    for pair in report.boxes.windows(2) {
        assert_eq!(pair[0].offset + pair[0].size, pair[1].offset);
    }
}

#[test]
fn test_two_second_trim() {
    let stream = AvcStream::new(640, 360);
    let mut track = avc_track(&stream, 0..90);
    // 30000 per second media timescale: start two seconds in, show one.
    track.edit_list = Some(vec![EditEntry {
        segment_duration: MOVIE_TIMESCALE as u64,
        media_time: 60_000,
        media_rate: 0x0001_0000,
    }]);
    let data = Mp4Builder::new(MOVIE_TIMESCALE).track(track).build();
    let analysis = run(&data);

    let trims: Vec<_> = analysis
        .report
        .anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::Trim)
        .collect();
    assert_eq!(trims.len(), 1);
    assert_eq!(trims[0].track_id, Some(1));
    assert!(trims[0].confidence >= 0.5);
    assert!(!kinds(&analysis).contains(&AnomalyKind::Rotate));
    assert!(!kinds(&analysis).contains(&AnomalyKind::Crop));

    assert_eq!(analysis.report.tracks[0].hidden_samples.len(), 60);
    assert_eq!(analysis.report.tracks[0].hidden_samples[0], 1);
}

#[test]
fn test_portrait_display_of_landscape_stream_is_rotated() {
    let stream = AvcStream::new(1920, 1080);
    let mut track = avc_track(&stream, 0..20);
    track.display_width = 1080;
    track.display_height = 1920;
    track.matrix = TransformMatrix::rotation(90);
    let data = Mp4Builder::new(MOVIE_TIMESCALE).track(track).build();
    let analysis = run(&data);

    assert!(kinds(&analysis).contains(&AnomalyKind::Rotate));
    assert!(!kinds(&analysis).contains(&AnomalyKind::Crop));

    let track = &analysis.report.tracks[0];
    assert_eq!(track.orientation.rotation, 90);
    assert_eq!(track.declared.track, Dimensions::new(1080, 1920));
    assert_eq!(
        track.derived.as_ref().map(|d| d.cropped),
        Some(Dimensions::new(1920, 1080))
    );
}

#[test]
fn test_two_leftover_pictures_are_recovered() {
    let data = avc_with_leftover_frames(2);
    let analysis = run(&data);
    let recovery = &analysis.report.recovery;

    assert_eq!(recovery.frames.len(), 2);
    for frame in &recovery.frames {
        assert_eq!(frame.status, FrameStatus::Decodable);
        assert_eq!(frame.dimensions, Some(Dimensions::new(640, 360)));
    }
    assert!(recovery.rejected.is_empty());
    assert_eq!(analysis.streams.len(), 2);
    assert!(kinds(&analysis).contains(&AnomalyKind::UnreferencedRegion));
}

#[test]
fn test_recovered_ranges_never_overlap_samples() {
    let data = avc_with_leftover_frames(3);
    let analysis = run(&data);

    let mut reader = BoxReader::new(Cursor::new(&data), data.len() as u64);
    let tree = reader.read_tree().unwrap();
    let movie = Movie::parse(&mut reader, &tree).unwrap();

    assert_eq!(analysis.report.recovery.frames.len(), 3);
    for frame in &analysis.report.recovery.frames {
        assert!(movie.all_samples().all(|s| !s.range().overlaps(&frame.range)));
        for unit in &frame.units {
            assert!(frame.range.encloses(unit));
        }
    }
}

#[test]
fn test_truncated_header_at_end_of_file() {
    let mut data = untouched_avc();
    let intact = data.len() as u64;
    data.extend_from_slice(&[0, 0, 0]);
    let analysis = run(&data);
    let report = &analysis.report;

    assert_eq!(report.structure_errors.len(), 1);
    assert_eq!(report.structure_errors[0].offset, intact);
    assert_matches!(
        report.structure_errors[0].kind,
        StructuralErrorKind::TruncatedHeader { available: 3 }
    );
    assert_eq!(report.errors.len(), 1);
    assert_eq!(kinds(&analysis), vec![AnomalyKind::Structure]);

    let types: Vec<String> = report.boxes.iter().map(|b| b.box_type.to_string()).collect();
    assert_eq!(types, vec!["ftyp", "mdat", "moov"]);
}

#[test]
fn test_pipeline_is_idempotent() {
    let data = avc_with_leftover_frames(2);
    let first = serde_json::to_string(&run(&data).report).unwrap();
    let second = serde_json::to_string(&run(&data).report).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_missing_movie_box_is_reported() {
    let data = Mp4Builder::new(MOVIE_TIMESCALE)
        .track(TrackSpec::audio(1))
        .build();
    // Keep only ftyp.
    let ftyp_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let analysis = run(&data[..ftyp_len]);

    assert!(analysis.report.movie.is_none());
    assert_eq!(analysis.report.errors.len(), 1);
    assert!(analysis.report.errors[0].contains("moov"));
}

#[test]
fn test_extracts_decodable_frames_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_fixture(temp.path(), "leftover.mp4", &avc_with_leftover_frames(2));
    let analysis = analyze_file(&path, &ForensicOptions::default()).unwrap();
    assert_eq!(analysis.report.path, path);

    let out = temp.path().join("frames");
    let written = write_frames(&out, &path, &analysis.streams).unwrap();
    assert_eq!(written.len(), 2);
    assert!(written[0].ends_with("leftover.mp4/frame_0000.h264"));
    assert!(written[1].ends_with("leftover.mp4/frame_0001.h264"));

    // Parameter sets come first, each behind a start code.
    let bytes = std::fs::read(&written[0]).unwrap();
    assert_eq!(&bytes[..5], &[0, 0, 0, 1, 0x67]);
    assert!(bytes.windows(5).any(|w| w == [0, 0, 0, 1, 0x65]));
}

#[test]
fn test_report_json_has_named_fields() {
    let analysis = run(&avc_with_leftover_frames(1));
    let value = serde_json::to_value(&analysis.report).unwrap();

    assert_eq!(value["tracks"][0]["track_id"], 1);
    assert_eq!(value["tracks"][0]["declared"]["track"]["width"], 640);
    assert_eq!(value["recovery"]["frames"][0]["status"], "decodable");
    assert!(value["anomalies"][0]["signals"].is_array());
    assert!(value["movie"]["timescale"].is_number());
}
