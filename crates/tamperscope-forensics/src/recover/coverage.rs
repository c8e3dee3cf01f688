//! Media data not covered by any sample table.

use serde::Serialize;
use tamperscope_media::mp4::{Movie, Sample, TrackRef};
use tamperscope_media::ByteRange;

/// A declared sample, by track and 1-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SampleRef {
    #[serde(skip)]
    pub track: TrackRef,
    pub track_id: u32,
    pub index: u32,
}

/// Declared samples bordering a gap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GapNeighbors {
    /// Sample ending where the gap starts.
    pub preceding: Option<SampleRef>,
    /// Sample starting where the gap ends.
    pub following: Option<SampleRef>,
}

/// A maximal run of `mdat` payload bytes no sample references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub range: ByteRange,
    pub neighbors: GapNeighbors,
}

/// Complement of all sample ranges within the `mdat` payloads, in file
/// order. Payloads are clamped to the file size.
pub fn uncovered_gaps(movie: &Movie) -> Vec<Gap> {
    let mut samples: Vec<&Sample> = movie.all_samples().filter(|s| s.size > 0).collect();
    samples.sort_by_key(|s| (s.offset, s.track, s.index));

    let sample_ref = |s: &Sample| SampleRef {
        track: s.track,
        track_id: movie.track(s.track).map_or(0, |t| t.track_id),
        index: s.index,
    };

    let mut gaps = Vec::new();
    for region in &movie.media_data {
        let end = region.end().min(movie.file_size);
        if end <= region.offset {
            continue;
        }
        let region = ByteRange::from_bounds(region.offset, end);

        let mut cursor = region.offset;
        let mut preceding: Option<SampleRef> = None;
        for sample in samples.iter().filter(|s| s.range().overlaps(&region)) {
            let range = sample.range();
            if range.offset > cursor {
                gaps.push(Gap {
                    range: ByteRange::from_bounds(cursor, range.offset),
                    neighbors: GapNeighbors {
                        preceding,
                        following: Some(sample_ref(sample)),
                    },
                });
            }
            if range.end() >= cursor {
                cursor = range.end();
                preceding = Some(sample_ref(sample));
            }
        }
        if cursor < region.end() {
            gaps.push(Gap {
                range: ByteRange::from_bounds(cursor, region.end()),
                neighbors: GapNeighbors {
                    preceding,
                    following: None,
                },
            });
        }
    }
    gaps
}
