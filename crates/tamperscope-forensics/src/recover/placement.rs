//! Where a recovered picture probably belonged.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use serde::Serialize;
use tamperscope_media::mp4::{BoxReader, Sample, Track, TrackRef};
use tamperscope_media::ByteRange;
use tamperscope_probe::{Dimensions, StreamAnalyzer};
use tracing::warn;

/// Side of the declared sample the recovered picture sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// The picture was stored after the sample.
    After,
    /// The picture was stored before the sample.
    Before,
}

/// Advisory position of a recovered picture in the track's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlacementHint {
    pub track_id: u32,
    /// Declared sample the picture is adjacent to.
    pub sample: u32,
    pub relation: Relation,
}

/// Finds and caches the coded size of declared samples.
pub struct Placer<'a> {
    track: &'a Track,
    analyzer: StreamAnalyzer,
    /// Non-empty samples sorted by end offset.
    by_end: Vec<Sample>,
    /// The same samples sorted by start offset.
    by_offset: Vec<Sample>,
    cache: BTreeMap<(TrackRef, u32), Option<Dimensions>>,
}

impl<'a> Placer<'a> {
    pub fn new(track: &'a Track, analyzer: &StreamAnalyzer) -> Self {
        let mut by_offset: Vec<Sample> = track
            .samples()
            .map(|table| table.iter().filter(|s| s.size > 0).copied().collect())
            .unwrap_or_default();
        by_offset.sort_by_key(|s| (s.offset, s.index));
        let mut by_end = by_offset.clone();
        by_end.sort_by_key(|s| (s.range().end(), s.index));
        Self {
            track,
            analyzer: analyzer.clone(),
            by_end,
            by_offset,
            cache: BTreeMap::new(),
        }
    }

    /// Nearest declared sample of the track stored before `range`, then
    /// after it, whose coded size is `dimensions`.
    pub fn place<R: Read + Seek>(
        &mut self,
        reader: &mut BoxReader<R>,
        range: ByteRange,
        dimensions: Dimensions,
    ) -> Option<PlacementHint> {
        let ending_before = self.by_end.partition_point(|s| s.range().end() <= range.offset);
        let before = ending_before
            .checked_sub(1)
            .and_then(|i| self.by_end.get(i))
            .copied();
        let starting_after = self.by_offset.partition_point(|s| s.offset < range.end());
        let after = self.by_offset.get(starting_after).copied();

        for (sample, relation) in [(before, Relation::After), (after, Relation::Before)] {
            let Some(sample) = sample else {
                continue;
            };
            if self.dimensions_of(reader, &sample) == Some(dimensions) {
                return Some(PlacementHint {
                    track_id: self.track.track_id,
                    sample: sample.index,
                    relation,
                });
            }
        }
        None
    }

    fn dimensions_of<R: Read + Seek>(
        &mut self,
        reader: &mut BoxReader<R>,
        sample: &Sample,
    ) -> Option<Dimensions> {
        let key = (sample.track, sample.index);
        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }
        let dimensions = if sample.range().end() > reader.file_size() {
            None
        } else {
            match reader.read_range(sample.range()) {
                Ok(data) => self.analyzer.analyze_sample(&data, sample.offset).dimensions(),
                Err(e) => {
                    warn!(
                        track_id = self.track.track_id,
                        sample = sample.index,
                        "cannot read sample for placement: {}",
                        e
                    );
                    None
                }
            }
        };
        self.cache.insert(key, dimensions);
        dimensions
    }
}
