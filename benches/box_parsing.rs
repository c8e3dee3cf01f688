//! Benchmarks for box tree parsing and sample table resolution
//!
//! Runs the container layer over synthetic files with growing sample
//! counts, plus the full forensic pass over the largest one.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Cursor;
use tamperscope_forensics::{analyze_movie, ForensicOptions};
use tamperscope_media::mp4::{BoxReader, Movie};
use tamperscope_media::synth::{Mp4Builder, SynthSample, TrackSpec};
use tamperscope_probe::synth::{length_prefixed, AvcStream};

fn synthetic_file(frames: u32) -> Vec<u8> {
    let stream = AvcStream::new(1280, 720);
    let mut video = TrackSpec::video(1, *b"avc1", 1280, 720);
    video.config = Some((*b"avcC", stream.avcc()));
    video.samples = (0..frames)
        .map(|n| {
            let k = n % 30;
            SynthSample::new(length_prefixed(&[stream.slice(k == 0, k % 16, k * 2)], 4), k == 0)
        })
        .collect();

    let mut audio = TrackSpec::audio(2);
    audio.samples = (0..frames * 3 / 2)
        .map(|_| SynthSample::new(vec![0x21; 64], true))
        .collect();

    Mp4Builder::new(600).track(video).track(audio).build()
}

fn bench_read_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_tree");
    for frames in [300u32, 3_000, 30_000] {
        let data = synthetic_file(frames);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &data, |b, data| {
            b.iter(|| {
                let mut reader = BoxReader::new(Cursor::new(data), data.len() as u64);
                black_box(reader.read_tree().unwrap())
            })
        });
    }
    group.finish();
}

fn bench_resolve_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_samples");
    for frames in [300u32, 3_000, 30_000] {
        let data = synthetic_file(frames);
        let mut reader = BoxReader::new(Cursor::new(&data), data.len() as u64);
        let tree = reader.read_tree().unwrap();
        group.throughput(Throughput::Elements(frames as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &tree, |b, tree| {
            b.iter(|| black_box(Movie::parse(&mut reader, tree).unwrap()))
        });
    }
    group.finish();
}

fn bench_full_analysis(c: &mut Criterion) {
    let data = synthetic_file(3_000);
    let options = ForensicOptions::default();
    c.bench_function("analyze_movie_3000_frames", |b| {
        b.iter(|| {
            let mut reader = BoxReader::new(Cursor::new(&data), data.len() as u64);
            let tree = reader.read_tree().unwrap();
            let movie = Movie::parse(&mut reader, &tree).unwrap();
            black_box(analyze_movie(&mut reader, &tree, &movie, &options))
        })
    });
}

criterion_group!(
    benches,
    bench_read_tree,
    bench_resolve_samples,
    bench_full_analysis
);
criterion_main!(benches);
