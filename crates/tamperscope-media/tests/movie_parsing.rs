//! Integration tests for tamperscope-media

use std::fs::File;
use std::io::{Cursor, Write};

use tamperscope_media::mp4::{BoxReader, EditEntry, FourCc, HandlerType, Movie, TransformMatrix};
use tamperscope_media::synth::{FragmentSpec, MdatItem, Mp4Builder, SynthSample, TrackSpec};
use tamperscope_media::StructuralErrorKind;

fn video_track(frames: usize) -> TrackSpec {
    let mut t = TrackSpec::video(1, *b"avc1", 320, 240);
    t.samples = (0..frames)
        .map(|i| SynthSample::new(vec![i as u8; 100 + i], i % 10 == 0))
        .collect();
    t
}

fn parse(data: Vec<u8>) -> (tamperscope_media::BoxTree, Movie) {
    let len = data.len() as u64;
    let mut reader = BoxReader::new(Cursor::new(data), len);
    let tree = reader.read_tree().unwrap();
    let movie = Movie::parse(&mut reader, &tree).unwrap();
    (tree, movie)
}

#[test]
fn test_root_boxes_tile_file() {
    let data = Mp4Builder::new(600)
        .track(video_track(30))
        .track({
            let mut a = TrackSpec::audio(2);
            a.samples = (0..20).map(|_| SynthSample::new(vec![0x21; 200], true)).collect();
            a
        })
        .build();
    let len = data.len() as u64;
    let (tree, movie) = parse(data);

    assert_eq!(tree.covered_bytes(), len);
    let mut end = 0;
    for b in &tree.boxes {
        assert_eq!(b.offset, end);
        end = b.offset + b.size;
    }

    assert_eq!(movie.tracks.len(), 2);
    assert_eq!(movie.tracks[0].handler, HandlerType::Video);
    assert_eq!(movie.tracks[1].handler, HandlerType::Audio);
}

#[test]
fn test_sample_count_matches_every_table() {
    let (_, movie) = parse(Mp4Builder::new(600).track(video_track(45)).build());
    let table = movie.tracks[0].samples().unwrap();
    assert_eq!(table.len(), 45);
    assert_eq!(table.sync_samples().count(), 5);
    assert_eq!(table.media_duration(), 45_000);
}

#[test]
fn test_samples_never_overlap_and_stay_in_mdat() {
    let data = Mp4Builder::new(600)
        .track(video_track(12))
        .layout(vec![
            MdatItem::Sample { track: 0, index: 0 },
            MdatItem::Raw(vec![0; 64]),
        ])
        .build();
    let (_, movie) = parse(data);
    let mdat = movie.media_data[0];
    let mut ranges: Vec<_> = movie.all_samples().map(|s| s.range()).collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].end() <= pair[1].offset);
    }
    assert!(ranges.iter().all(|r| mdat.encloses(r)));
}

#[test]
fn test_edit_list_hides_leading_samples() {
    let mut track = video_track(90);
    // Movie timescale 600: 2 s presented starting at media time 1 s.
    track.edit_list = Some(vec![EditEntry {
        segment_duration: 1200,
        media_time: 30_000,
        media_rate: 0x0001_0000,
    }]);
    let (_, movie) = parse(Mp4Builder::new(600).track(track).build());
    let t = &movie.tracks[0];
    assert_eq!(t.header.duration, 1200);
    let table = t.samples().unwrap();
    let hidden: Vec<_> = table.hidden_samples().map(|s| s.index).collect();
    assert_eq!(hidden.len(), 30);
    assert_eq!(hidden[0], 1);
    assert!(table.get(31).unwrap().presented);
}

#[test]
fn test_matrix_and_dimensions_are_reported() {
    let mut track = video_track(3);
    track.matrix = TransformMatrix::rotation(90);
    track.display_width = 240;
    track.display_height = 320;
    let (_, movie) = parse(Mp4Builder::new(600).track(track).build());
    let t = &movie.tracks[0];
    assert_eq!(t.header.dimensions(), (240, 320));
    assert_eq!(t.entry_dimensions(), Some((320, 240)));
    assert!(t.header.matrix.swaps_dimensions());
}

#[test]
fn test_udta_metadata() {
    let data = Mp4Builder::new(600)
        .track(video_track(2))
        .udta_text([0xA9, b't', b'o', b'o'], "Photos 9.0")
        .build();
    let (_, movie) = parse(data);
    assert_eq!(movie.metadata.len(), 1);
    assert_eq!(movie.metadata[0].key, "©too");
    assert_eq!(movie.metadata[0].value, "Photos 9.0");
}

#[test]
fn test_truncated_file_keeps_prior_boxes() {
    let mut data = Mp4Builder::new(600).track(video_track(5)).build();
    let moov_start = {
        let len = data.len() as u64;
        let mut reader = BoxReader::new(Cursor::new(data.clone()), len);
        reader.read_tree().unwrap().boxes[2].offset as usize
    };
    // Cut into the moov header.
    data.truncate(moov_start + 3);

    let len = data.len() as u64;
    let mut reader = BoxReader::new(Cursor::new(data), len);
    let tree = reader.read_tree().unwrap();
    assert_eq!(tree.boxes.len(), 2);
    let fatal = tree.fatal_error().unwrap();
    assert_eq!(fatal.offset, moov_start as u64);
    assert_eq!(fatal.kind, StructuralErrorKind::TruncatedHeader { available: 3 });
}

#[test]
fn test_fragment_samples_resolve_at_moof_offsets() {
    let fragment = |first: usize| {
        FragmentSpec::new(
            0,
            (first..first + 5)
                .map(|i| SynthSample::new(vec![i as u8; 50 + i], i % 10 == 0))
                .collect(),
        )
    };
    let data = Mp4Builder::new(600)
        .track(video_track(10))
        .fragment(fragment(10))
        .fragment(fragment(15))
        .build();
    let (tree, movie) = parse(data);

    assert!(tree.errors.is_empty());
    assert!(movie.is_fragmented());
    assert_eq!(movie.fragment_count, 2);
    assert_eq!(movie.media_data.len(), 3);

    let table = movie.tracks[0].samples().unwrap();
    assert_eq!(table.len(), 20);

    // Each run starts right after its moof and the mdat header.
    let moofs: Vec<_> = tree.top_all(FourCc::MOOF).collect();
    assert_eq!(moofs.len(), 2);
    assert_eq!(table.get(11).unwrap().offset, moofs[0].offset + moofs[0].size + 8);
    assert_eq!(table.get(16).unwrap().offset, moofs[1].offset + moofs[1].size + 8);
    assert_eq!(table.get(12).unwrap().offset, table.get(11).unwrap().range().end());
    assert_eq!(table.get(12).unwrap().size, 61);

    // Decode time continues across moov and fragments.
    assert_eq!(table.get(11).unwrap().dts, 10_000);
    assert_eq!(table.get(20).unwrap().dts, 19_000);
    assert!(table.get(11).unwrap().is_sync);
    assert!(!table.get(12).unwrap().is_sync);

    let mut ranges: Vec<_> = movie.all_samples().map(|s| s.range()).collect();
    ranges.sort();
    assert!(ranges
        .iter()
        .all(|r| movie.media_data.iter().any(|m| m.encloses(r))));
}

#[test]
fn test_parse_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mov");
    let data = Mp4Builder::new(600).track(video_track(4)).build();
    File::create(&path).unwrap().write_all(&data).unwrap();

    let mut reader = BoxReader::from_seekable(File::open(&path).unwrap()).unwrap();
    assert_eq!(reader.file_size(), data.len() as u64);
    let tree = reader.read_tree().unwrap();
    let movie = Movie::parse(&mut reader, &tree).unwrap();
    assert_eq!(movie.tracks[0].samples().unwrap().len(), 4);
}
