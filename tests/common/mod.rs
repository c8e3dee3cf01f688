//! Shared fixtures for integration tests.
//!
//! Files are synthesized with the media and probe crates' `synth` writers:
//! an H.264 or HEVC track whose samples are single-slice pictures in GOPs of
//! ten, optionally with bytes left in `mdat` that no table references.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tamperscope_media::synth::{MdatItem, Mp4Builder, SynthSample, TrackSpec};
use tamperscope_probe::synth::{length_prefixed, AvcStream, HevcStream};

pub const GOP: u32 = 10;

/// Movie timescale used by every fixture.
pub const MOVIE_TIMESCALE: u32 = 600;

/// Picture `n` of an H.264 stream as a 4-byte length-prefixed sample.
pub fn avc_frame(stream: &AvcStream, n: u32) -> Vec<u8> {
    let k = n % GOP;
    length_prefixed(&[stream.slice(k == 0, k, k * 2)], 4)
}

/// Picture `n` of an HEVC stream: IDR at GOP starts, trailing pictures
/// otherwise.
pub fn hevc_frame(stream: &HevcStream, n: u32) -> Vec<u8> {
    let k = n % GOP;
    let nal_type = if k == 0 { 20 } else { 1 };
    length_prefixed(&[stream.slice(nal_type, k * 2)], 4)
}

/// Track 1 holding pictures `frames` of an H.264 stream.
pub fn avc_track(stream: &AvcStream, frames: std::ops::Range<u32>) -> TrackSpec {
    let mut spec = TrackSpec::video(1, *b"avc1", stream.width as u16, stream.height as u16);
    spec.config = Some((*b"avcC", stream.avcc()));
    spec.samples = frames
        .map(|n| SynthSample::new(avc_frame(stream, n), n % GOP == 0))
        .collect();
    spec
}

/// Track 1 holding pictures `frames` of an HEVC stream.
pub fn hevc_track(stream: &HevcStream, frames: std::ops::Range<u32>) -> TrackSpec {
    let mut spec = TrackSpec::video(1, *b"hvc1", stream.width as u16, stream.height as u16);
    spec.config = Some((*b"hvcC", stream.hvcc()));
    spec.samples = frames
        .map(|n| SynthSample::new(hevc_frame(stream, n), n % GOP == 0))
        .collect();
    spec
}

/// One second of untouched 640x360 H.264 video.
pub fn untouched_avc() -> Vec<u8> {
    let stream = AvcStream::new(640, 360);
    Mp4Builder::new(MOVIE_TIMESCALE)
        .track(avc_track(&stream, 0..30))
        .build()
}

/// One second of untouched H.264 video with about 1.5 seconds of audio.
pub fn untouched_avc_with_audio() -> Vec<u8> {
    let stream = AvcStream::new(640, 360);
    let mut audio = TrackSpec::audio(2);
    audio.samples = (0..65)
        .map(|_| SynthSample::new(vec![0x21; 200], true))
        .collect();
    Mp4Builder::new(MOVIE_TIMESCALE)
        .track(avc_track(&stream, 0..30))
        .track(audio)
        .build()
}

/// Twenty declared pictures followed by `extra` more that only `mdat` holds.
pub fn avc_with_leftover_frames(extra: u32) -> Vec<u8> {
    let stream = AvcStream::new(640, 360);
    let track = avc_track(&stream, 0..20);
    let mut layout: Vec<MdatItem> = (0..20)
        .map(|index| MdatItem::Sample { track: 0, index })
        .collect();
    let leftover: Vec<u8> = (20..20 + extra).flat_map(|n| avc_frame(&stream, n)).collect();
    layout.push(MdatItem::Raw(leftover));
    Mp4Builder::new(MOVIE_TIMESCALE)
        .track(track)
        .layout(layout)
        .build()
}

/// Write `data` to `dir/name`.
pub fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}
