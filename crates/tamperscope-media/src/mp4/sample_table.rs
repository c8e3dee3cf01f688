//! MP4 sample table resolution.
//!
//! Sample tables describe where every sample of a track lives:
//! - stts: sample durations (decoding time)
//! - ctts: composition time offsets (for B-frames)
//! - stss: sync sample table (keyframes)
//! - stsc: sample-to-chunk mapping
//! - stsz/stz2: sample sizes
//! - stco/co64: chunk offsets
//!
//! The run-length tables are expanded lazily by [`TimeRuns`] and [`ChunkRuns`].
//! Every table must account for exactly the same number of samples; any
//! disagreement is a [`ResolutionError`] for the track.

use serde::Serialize;

use super::boxes::ByteRange;
use super::fields::Fields;
use crate::error::ResolutionError;

/// Upper bound on samples per track; larger tables are treated as corrupt.
pub const MAX_SAMPLES: u64 = 20_000_000;

/// Index of a track within [`Movie::tracks`](super::Movie::tracks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackRef(pub usize);

/// A resolved sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// Sample number (1-based, decode order).
    pub index: u32,
    /// Absolute file offset of the sample data.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Decode timestamp in media timescale.
    pub dts: u64,
    /// Duration in media timescale.
    pub duration: u32,
    /// Composition time offset.
    pub cts_offset: i32,
    /// Sync sample (keyframe).
    pub is_sync: bool,
    /// Whether the edit list presents this sample.
    pub presented: bool,
    /// Owning track.
    pub track: TrackRef,
}

impl Sample {
    /// Presentation timestamp (may be negative with signed ctts).
    pub fn pts(&self) -> i64 {
        self.dts as i64 + self.cts_offset as i64
    }

    /// Byte range of the sample data.
    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.offset, self.size as u64)
    }
}

/// A run of `count` samples sharing one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRun<T> {
    pub count: u32,
    pub value: T,
}

/// One `stsc` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRun {
    /// First chunk (1-based) this entry applies to.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub description_index: u32,
}

/// Sample sizes from `stsz` or `stz2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSizes {
    Uniform { size: u32, count: u32 },
    PerSample(Vec<u32>),
}

impl Default for SampleSizes {
    fn default() -> Self {
        Self::PerSample(Vec::new())
    }
}

impl SampleSizes {
    pub fn count(&self) -> u64 {
        match self {
            Self::Uniform { count, .. } => *count as u64,
            Self::PerSample(sizes) => sizes.len() as u64,
        }
    }

    fn get(&self, i: usize) -> Option<u32> {
        match self {
            Self::Uniform { size, .. } => Some(*size),
            Self::PerSample(sizes) => sizes.get(i).copied(),
        }
    }
}

/// Expands run-length time tables into per-sample values.
pub struct TimeRuns<'a, T> {
    runs: &'a [TimeRun<T>],
    run: usize,
    emitted: u32,
}

impl<'a, T> TimeRuns<'a, T> {
    pub fn new(runs: &'a [TimeRun<T>]) -> Self {
        Self {
            runs,
            run: 0,
            emitted: 0,
        }
    }
}

impl<T: Copy> Iterator for TimeRuns<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let run = self.runs.get(self.run)?;
            if self.emitted < run.count {
                self.emitted += 1;
                return Some(run.value);
            }
            self.run += 1;
            self.emitted = 0;
        }
    }
}

/// A chunk with its resolved sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk index (0-based into the offset table).
    pub index: usize,
    pub samples: u32,
    pub description_index: u32,
}

/// Expands `stsc` over a known chunk count.
pub struct ChunkRuns<'a> {
    runs: &'a [ChunkRun],
    chunk_count: usize,
    next_chunk: usize,
    run: Option<usize>,
}

impl<'a> ChunkRuns<'a> {
    pub fn new(runs: &'a [ChunkRun], chunk_count: usize) -> Self {
        Self {
            runs,
            chunk_count,
            next_chunk: 0,
            run: None,
        }
    }
}

impl Iterator for ChunkRuns<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_chunk >= self.chunk_count {
            return None;
        }
        let number = self.next_chunk as u64 + 1;
        let mut candidate = self.run.map_or(0, |r| r + 1);
        while candidate < self.runs.len() && self.runs[candidate].first_chunk as u64 <= number {
            self.run = Some(candidate);
            candidate += 1;
        }
        let chunk = match self.run.map(|r| self.runs[r]) {
            Some(run) => Chunk {
                index: self.next_chunk,
                samples: run.samples_per_chunk,
                description_index: run.description_index,
            },
            // Chunks before the first entry hold no samples.
            None => Chunk {
                index: self.next_chunk,
                samples: 0,
                description_index: 0,
            },
        };
        self.next_chunk += 1;
        Some(chunk)
    }
}

/// Raw sample table boxes of one track.
#[derive(Debug, Clone, Default)]
pub struct SampleTableBuilder {
    time_to_sample: Vec<TimeRun<u32>>,
    composition_offsets: Option<Vec<TimeRun<i32>>>,
    sync_samples: Option<Vec<u32>>,
    sample_to_chunk: Vec<ChunkRun>,
    sizes: SampleSizes,
    chunk_offsets: Vec<u64>,
}

impl SampleTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time_to_sample(&mut self, runs: Vec<TimeRun<u32>>) {
        self.time_to_sample = runs;
    }

    pub fn set_composition_offsets(&mut self, runs: Vec<TimeRun<i32>>) {
        self.composition_offsets = Some(runs);
    }

    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = Some(samples);
    }

    pub fn set_sample_to_chunk(&mut self, runs: Vec<ChunkRun>) {
        self.sample_to_chunk = runs;
    }

    pub fn set_sizes(&mut self, sizes: SampleSizes) {
        self.sizes = sizes;
    }

    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    /// Resolve every sample to an absolute byte range.
    pub fn build(
        &self,
        track_id: u32,
        track: TrackRef,
        file_size: u64,
    ) -> Result<SampleTable, ResolutionError> {
        let fail = |message: String| ResolutionError::new(track_id, message);

        let count = self.sizes.count();
        if count > MAX_SAMPLES {
            return Err(fail(format!("stsz declares {} samples", count)));
        }

        let stts_total: u64 = self.time_to_sample.iter().map(|r| r.count as u64).sum();
        if stts_total != count {
            return Err(fail(format!(
                "stts covers {} samples, stsz declares {}",
                stts_total, count
            )));
        }

        if let Some(ctts) = &self.composition_offsets {
            let ctts_total: u64 = ctts.iter().map(|r| r.count as u64).sum();
            if ctts_total != count {
                return Err(fail(format!(
                    "ctts covers {} samples, stsz declares {}",
                    ctts_total, count
                )));
            }
        }

        let mut previous = 0u32;
        for run in &self.sample_to_chunk {
            if run.first_chunk <= previous {
                return Err(fail(format!(
                    "stsc first_chunk {} does not increase",
                    run.first_chunk
                )));
            }
            previous = run.first_chunk;
        }

        let chunk_count = self.chunk_offsets.len();
        let mapped: u64 = ChunkRuns::new(&self.sample_to_chunk, chunk_count)
            .map(|c| c.samples as u64)
            .sum();
        if mapped != count {
            return Err(fail(format!(
                "stsc maps {} samples over {} chunks, stsz declares {}",
                mapped, chunk_count, count
            )));
        }

        let mut sync = None;
        if let Some(entries) = &self.sync_samples {
            let mut flags = vec![false; count as usize];
            for &n in entries {
                if n == 0 || n as u64 > count {
                    return Err(fail(format!(
                        "stss references sample {} of {}",
                        n, count
                    )));
                }
                flags[n as usize - 1] = true;
            }
            sync = Some(flags);
        }

        let mut durations = TimeRuns::new(&self.time_to_sample);
        let mut offsets = self
            .composition_offsets
            .as_deref()
            .map(TimeRuns::new);

        let mut samples = Vec::with_capacity(count as usize);
        let mut dts = 0u64;
        for chunk in ChunkRuns::new(&self.sample_to_chunk, chunk_count) {
            let mut offset = self.chunk_offsets[chunk.index];
            for _ in 0..chunk.samples {
                let i = samples.len();
                let size = self.sizes.get(i).ok_or_else(|| fail("stsz exhausted".into()))?;
                let duration = durations
                    .next()
                    .ok_or_else(|| fail("stts exhausted".into()))?;
                let cts_offset = match offsets.as_mut() {
                    Some(it) => it.next().ok_or_else(|| fail("ctts exhausted".into()))?,
                    None => 0,
                };
                let end = offset
                    .checked_add(size as u64)
                    .filter(|&end| end <= file_size)
                    .ok_or_else(|| {
                        fail(format!(
                            "sample {} at offset {} (+{}) extends past end of file",
                            i + 1,
                            offset,
                            size
                        ))
                    })?;

                samples.push(Sample {
                    index: i as u32 + 1,
                    offset,
                    size,
                    dts,
                    duration,
                    cts_offset,
                    is_sync: sync.as_ref().map_or(true, |flags| flags[i]),
                    presented: true,
                    track,
                });

                offset = end;
                dts += duration as u64;
            }
        }

        Ok(SampleTable {
            samples,
            has_sync_table: self.sync_samples.is_some(),
            has_composition_offsets: self.composition_offsets.is_some(),
        })
    }
}

/// Samples of one track in decode order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTable {
    samples: Vec<Sample>,
    /// Whether an `stss` box was present (absent means every sample is sync).
    pub has_sync_table: bool,
    /// Whether a `ctts` box was present.
    pub has_composition_offsets: bool,
}

impl SampleTable {
    /// Create a new sample table builder.
    pub fn builder() -> SampleTableBuilder {
        SampleTableBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample by 1-based index.
    pub fn get(&self, index: u32) -> Option<&Sample> {
        index
            .checked_sub(1)
            .and_then(|i| self.samples.get(i as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Sync samples in decode order.
    pub fn sync_samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.is_sync)
    }

    /// Samples the edit list does not present.
    pub fn hidden_samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| !s.presented)
    }

    /// Sum of sample durations in media timescale.
    pub fn media_duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }

    /// Composition offset of the first sample (the B-frame lead-in).
    pub fn composition_lead_in(&self) -> i64 {
        self.samples.first().map_or(0, |s| s.cts_offset as i64)
    }

    /// Mark samples presented when their pts falls in any range.
    pub fn apply_presentation(&mut self, ranges: &[PresentedRange]) {
        for sample in &mut self.samples {
            let pts = sample.pts();
            sample.presented = ranges.iter().any(|r| r.contains(pts));
        }
    }

    /// Append fragment samples, renumbering them after the existing ones.
    pub fn extend_from_fragment(&mut self, samples: impl IntoIterator<Item = Sample>) {
        for mut sample in samples {
            sample.index = self.samples.len() as u32 + 1;
            self.samples.push(sample);
        }
    }
}

/// Half-open media-time interval presented by an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresentedRange {
    pub start: i64,
    /// `None` for an edit that runs to the end of the media.
    pub end: Option<i64>,
}

impl PresentedRange {
    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && self.end.map_or(true, |end| t < end)
    }
}

fn truncated(name: &str, declared: u32, entry_size: usize, available: usize) -> String {
    format!(
        "{} truncated: declares {} entries, payload holds {}",
        name,
        declared,
        available / entry_size
    )
}

/// Parse `stts` into duration runs.
pub fn parse_stts(data: &[u8]) -> Result<Vec<TimeRun<u32>>, String> {
    let mut f = Fields::new(data);
    f.version_flags().ok_or("stts too short")?;
    let n = f.u32().ok_or("stts too short")?;
    if (n as usize).saturating_mul(8) > f.remaining() {
        return Err(truncated("stts", n, 8, f.remaining()));
    }
    let mut runs = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let count = f.u32().ok_or("stts too short")?;
        let value = f.u32().ok_or("stts too short")?;
        runs.push(TimeRun { count, value });
    }
    Ok(runs)
}

/// Parse `ctts` into composition offset runs.
pub fn parse_ctts(data: &[u8]) -> Result<Vec<TimeRun<i32>>, String> {
    let mut f = Fields::new(data);
    f.version_flags().ok_or("ctts too short")?;
    let n = f.u32().ok_or("ctts too short")?;
    if (n as usize).saturating_mul(8) > f.remaining() {
        return Err(truncated("ctts", n, 8, f.remaining()));
    }
    let mut runs = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let count = f.u32().ok_or("ctts too short")?;
        // Version 0 is nominally unsigned but writers store signed values.
        let value = f.i32().ok_or("ctts too short")?;
        runs.push(TimeRun { count, value });
    }
    Ok(runs)
}

/// Parse `stss` sample numbers.
pub fn parse_stss(data: &[u8]) -> Result<Vec<u32>, String> {
    let mut f = Fields::new(data);
    f.version_flags().ok_or("stss too short")?;
    let n = f.u32().ok_or("stss too short")?;
    if (n as usize).saturating_mul(4) > f.remaining() {
        return Err(truncated("stss", n, 4, f.remaining()));
    }
    (0..n)
        .map(|_| f.u32().ok_or_else(|| "stss too short".to_string()))
        .collect()
}

/// Parse `stsc` entries.
pub fn parse_stsc(data: &[u8]) -> Result<Vec<ChunkRun>, String> {
    let mut f = Fields::new(data);
    f.version_flags().ok_or("stsc too short")?;
    let n = f.u32().ok_or("stsc too short")?;
    if (n as usize).saturating_mul(12) > f.remaining() {
        return Err(truncated("stsc", n, 12, f.remaining()));
    }
    let mut runs = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let first_chunk = f.u32().ok_or("stsc too short")?;
        let samples_per_chunk = f.u32().ok_or("stsc too short")?;
        let description_index = f.u32().ok_or("stsc too short")?;
        runs.push(ChunkRun {
            first_chunk,
            samples_per_chunk,
            description_index,
        });
    }
    Ok(runs)
}

/// Parse `stsz`.
pub fn parse_stsz(data: &[u8]) -> Result<SampleSizes, String> {
    let mut f = Fields::new(data);
    f.version_flags().ok_or("stsz too short")?;
    let size = f.u32().ok_or("stsz too short")?;
    let count = f.u32().ok_or("stsz too short")?;
    if size != 0 {
        return Ok(SampleSizes::Uniform { size, count });
    }
    if (count as usize).saturating_mul(4) > f.remaining() {
        return Err(truncated("stsz", count, 4, f.remaining()));
    }
    let sizes = (0..count)
        .map(|_| f.u32().ok_or_else(|| "stsz too short".to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SampleSizes::PerSample(sizes))
}

/// Parse compact `stz2` (4, 8 or 16 bit sizes).
pub fn parse_stz2(data: &[u8]) -> Result<SampleSizes, String> {
    let mut f = Fields::new(data);
    f.version_flags().ok_or("stz2 too short")?;
    f.skip(3).ok_or("stz2 too short")?;
    let field_size = f.u8().ok_or("stz2 too short")?;
    let count = f.u32().ok_or("stz2 too short")?;
    let needed_bits = (count as usize).saturating_mul(field_size as usize);
    if needed_bits.div_ceil(8) > f.remaining() {
        return Err(format!("stz2 truncated: {} samples of {} bits", count, field_size));
    }
    let table = f.rest();
    let sizes = match field_size {
        4 => (0..count as usize)
            .map(|i| {
                let byte = table[i / 2];
                if i % 2 == 0 { (byte >> 4) as u32 } else { (byte & 0x0F) as u32 }
            })
            .collect(),
        8 => table[..count as usize].iter().map(|&b| b as u32).collect(),
        16 => table[..count as usize * 2]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]) as u32)
            .collect(),
        other => return Err(format!("stz2 field size {} unsupported", other)),
    };
    Ok(SampleSizes::PerSample(sizes))
}

/// Parse `stco` (32-bit) chunk offsets.
pub fn parse_stco(data: &[u8]) -> Result<Vec<u64>, String> {
    let mut f = Fields::new(data);
    f.version_flags().ok_or("stco too short")?;
    let n = f.u32().ok_or("stco too short")?;
    if (n as usize).saturating_mul(4) > f.remaining() {
        return Err(truncated("stco", n, 4, f.remaining()));
    }
    (0..n)
        .map(|_| f.u32().map(u64::from).ok_or_else(|| "stco too short".to_string()))
        .collect()
}

/// Parse `co64` (64-bit) chunk offsets.
pub fn parse_co64(data: &[u8]) -> Result<Vec<u64>, String> {
    let mut f = Fields::new(data);
    f.version_flags().ok_or("co64 too short")?;
    let n = f.u32().ok_or("co64 too short")?;
    if (n as usize).saturating_mul(8) > f.remaining() {
        return Err(truncated("co64", n, 8, f.remaining()));
    }
    (0..n)
        .map(|_| f.u64().ok_or_else(|| "co64 too short".to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: TrackRef = TrackRef(0);

    fn table_header(n: u32) -> Vec<u8> {
        let mut v = vec![0, 0, 0, 0];
        v.extend_from_slice(&n.to_be_bytes());
        v
    }

    fn builder() -> SampleTableBuilder {
        // 5 samples in two chunks (3 + 2).
        let mut b = SampleTable::builder();
        b.set_time_to_sample(vec![TimeRun { count: 5, value: 1000 }]);
        b.set_sample_to_chunk(vec![
            ChunkRun { first_chunk: 1, samples_per_chunk: 3, description_index: 1 },
            ChunkRun { first_chunk: 2, samples_per_chunk: 2, description_index: 1 },
        ]);
        b.set_sizes(SampleSizes::PerSample(vec![10, 20, 30, 40, 50]));
        b.set_chunk_offsets(vec![100, 500]);
        b
    }

    #[test]
    fn test_time_runs() {
        let runs = [
            TimeRun { count: 2, value: 5 },
            TimeRun { count: 0, value: 9 },
            TimeRun { count: 1, value: 7 },
        ];
        let values: Vec<_> = TimeRuns::new(&runs).collect();
        assert_eq!(values, vec![5, 5, 7]);
    }

    #[test]
    fn test_chunk_runs() {
        let runs = [
            ChunkRun { first_chunk: 1, samples_per_chunk: 4, description_index: 1 },
            ChunkRun { first_chunk: 3, samples_per_chunk: 1, description_index: 1 },
        ];
        let counts: Vec<_> = ChunkRuns::new(&runs, 4).map(|c| c.samples).collect();
        assert_eq!(counts, vec![4, 4, 1, 1]);
    }

    #[test]
    fn test_chunk_runs_gap_before_first_entry() {
        let runs = [ChunkRun { first_chunk: 2, samples_per_chunk: 3, description_index: 1 }];
        let counts: Vec<_> = ChunkRuns::new(&runs, 3).map(|c| c.samples).collect();
        assert_eq!(counts, vec![0, 3, 3]);
    }

    #[test]
    fn test_build_offsets_and_times() {
        let table = builder().build(1, T, 10_000).unwrap();
        assert_eq!(table.len(), 5);
        let offsets: Vec<_> = table.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 110, 130, 500, 540]);
        let s4 = table.get(4).unwrap();
        assert_eq!(s4.dts, 3000);
        assert_eq!(s4.index, 4);
        assert!(table.iter().all(|s| s.is_sync && s.presented));
        assert!(table.get(0).is_none());
        assert_eq!(table.media_duration(), 5000);
    }

    #[test]
    fn test_sync_and_composition() {
        let mut b = builder();
        b.set_sync_samples(vec![1, 4]);
        b.set_composition_offsets(vec![
            TimeRun { count: 1, value: 2000 },
            TimeRun { count: 4, value: 1000 },
        ]);
        let table = b.build(1, T, 10_000).unwrap();
        let sync: Vec<_> = table.sync_samples().map(|s| s.index).collect();
        assert_eq!(sync, vec![1, 4]);
        assert_eq!(table.composition_lead_in(), 2000);
        assert_eq!(table.get(2).unwrap().pts(), 2000);
    }

    #[test]
    fn test_count_mismatches() {
        let mut b = builder();
        b.set_time_to_sample(vec![TimeRun { count: 4, value: 1000 }]);
        let err = b.build(3, T, 10_000).unwrap_err();
        assert_eq!(err.track_id, 3);
        assert!(err.message.contains("stts covers 4"));

        let mut b = builder();
        b.set_chunk_offsets(vec![100]);
        assert!(b.build(1, T, 10_000).unwrap_err().message.contains("stsc maps 3"));

        let mut b = builder();
        b.set_composition_offsets(vec![TimeRun { count: 6, value: 0 }]);
        assert!(b.build(1, T, 10_000).unwrap_err().message.contains("ctts"));

        let mut b = builder();
        b.set_sync_samples(vec![6]);
        assert!(b.build(1, T, 10_000).unwrap_err().message.contains("stss"));
    }

    #[test]
    fn test_sample_past_end_of_file() {
        let err = builder().build(1, T, 550).unwrap_err();
        assert!(err.message.contains("sample 5"));
    }

    #[test]
    fn test_presentation_ranges() {
        let mut table = builder().build(1, T, 10_000).unwrap();
        table.apply_presentation(&[PresentedRange { start: 2000, end: None }]);
        let hidden: Vec<_> = table.hidden_samples().map(|s| s.index).collect();
        assert_eq!(hidden, vec![1, 2]);
    }

    #[test]
    fn test_parse_tables() {
        let mut stts = table_header(1);
        stts.extend_from_slice(&3u32.to_be_bytes());
        stts.extend_from_slice(&512u32.to_be_bytes());
        assert_eq!(parse_stts(&stts).unwrap(), vec![TimeRun { count: 3, value: 512 }]);

        let mut stsz = table_header(0);
        stsz.extend_from_slice(&2u32.to_be_bytes());
        stsz.extend_from_slice(&7u32.to_be_bytes());
        stsz.extend_from_slice(&9u32.to_be_bytes());
        assert_eq!(parse_stsz(&stsz).unwrap(), SampleSizes::PerSample(vec![7, 9]));

        let mut co64 = table_header(1);
        co64.extend_from_slice(&(1u64 << 33).to_be_bytes());
        assert_eq!(parse_co64(&co64).unwrap(), vec![1u64 << 33]);
    }

    #[test]
    fn test_parse_truncated_table() {
        let mut stco = table_header(3);
        stco.extend_from_slice(&8u32.to_be_bytes());
        let err = parse_stco(&stco).unwrap_err();
        assert_eq!(err, "stco truncated: declares 3 entries, payload holds 1");
    }

    #[test]
    fn test_parse_stz2_nibbles() {
        let mut stz2 = vec![0, 0, 0, 0, 0, 0, 0, 4];
        stz2.extend_from_slice(&3u32.to_be_bytes());
        stz2.extend_from_slice(&[0x12, 0x30]);
        assert_eq!(parse_stz2(&stz2).unwrap(), SampleSizes::PerSample(vec![1, 2, 3]));
    }
}
