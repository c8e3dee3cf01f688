//! Edit lists (`edts/elst`).
//!
//! An edit list maps movie time onto media time. Non-destructive editors trim
//! a clip by pointing the first edit past the start of the media while leaving
//! the samples in place, which is the main residue the trim check looks for.

use serde::Serialize;

use super::fields::Fields;
use super::sample_table::PresentedRange;

/// One edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EditEntry {
    /// Duration in movie timescale.
    pub segment_duration: u64,
    /// Start in media timescale; -1 for an empty edit.
    pub media_time: i64,
    /// Playback rate, 16.16 fixed point.
    pub media_rate: i32,
}

impl EditEntry {
    /// An empty edit inserts blank time.
    pub fn is_empty_edit(&self) -> bool {
        self.media_time == -1
    }
}

/// Parsed `elst`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditList {
    pub entries: Vec<EditEntry>,
}

impl EditList {
    /// Parse an `elst` payload.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut f = Fields::new(data);
        let (version, _) = f.version_flags()?;
        let count = f.u32()?;
        let entry_size = if version == 1 { 20 } else { 12 };
        if (count as usize).saturating_mul(entry_size) > f.remaining() {
            return None;
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (segment_duration, media_time) = if version == 1 {
                (f.u64()?, f.i64()?)
            } else {
                (f.u32()? as u64, f.i32()? as i64)
            };
            let media_rate = f.i32()?;
            entries.push(EditEntry {
                segment_duration,
                media_time,
                media_rate,
            });
        }
        Some(Self { entries })
    }

    /// Movie-time duration of leading empty edits.
    pub fn leading_empty_duration(&self) -> u64 {
        self.entries
            .iter()
            .take_while(|e| e.is_empty_edit())
            .map(|e| e.segment_duration)
            .sum()
    }

    /// Media time where presentation starts.
    pub fn first_media_time(&self) -> Option<i64> {
        self.entries
            .iter()
            .find(|e| !e.is_empty_edit())
            .map(|e| e.media_time)
    }

    /// Total movie-time duration of all edits.
    pub fn total_duration(&self) -> u64 {
        self.entries.iter().map(|e| e.segment_duration).sum()
    }

    /// Media-time ranges presented by the non-empty edits.
    ///
    /// A zero `segment_duration` is taken to mean "until the end of the media",
    /// as written by fragmented-file muxers.
    pub fn presented_ranges(&self, movie_timescale: u32, media_timescale: u32) -> Vec<PresentedRange> {
        self.entries
            .iter()
            .filter(|e| !e.is_empty_edit())
            .map(|e| {
                let end = if e.segment_duration == 0 {
                    None
                } else if e.media_rate == 0 {
                    // Dwell edit: holds a single instant.
                    Some(e.media_time + 1)
                } else {
                    let media = rescale(e.segment_duration, movie_timescale, media_timescale);
                    Some(e.media_time.saturating_add(media as i64))
                };
                PresentedRange {
                    start: e.media_time,
                    end,
                }
            })
            .collect()
    }

    /// End of the last presented range in media time.
    pub fn presented_media_end(&self, movie_timescale: u32, media_timescale: u32) -> Option<i64> {
        self.presented_ranges(movie_timescale, media_timescale)
            .last()
            .and_then(|r| r.end)
    }
}

/// Convert a duration between timescales without intermediate overflow.
pub fn rescale(value: u64, from: u32, to: u32) -> u64 {
    if from == 0 {
        return 0;
    }
    ((value as u128 * to as u128) / from as u128).min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elst_v0(entries: &[(u32, i32)]) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0];
        data.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for &(dur, time) in entries {
            data.extend_from_slice(&dur.to_be_bytes());
            data.extend_from_slice(&time.to_be_bytes());
            data.extend_from_slice(&0x0001_0000i32.to_be_bytes());
        }
        data
    }

    #[test]
    fn test_parse_and_ranges() {
        // Movie timescale 600, media timescale 30000: 2 s presented from 1 s.
        let list = EditList::parse(&elst_v0(&[(300, -1), (1200, 30000)])).unwrap();
        assert_eq!(list.entries.len(), 2);
        assert!(list.entries[0].is_empty_edit());
        assert_eq!(list.leading_empty_duration(), 300);
        assert_eq!(list.first_media_time(), Some(30000));
        assert_eq!(
            list.presented_ranges(600, 30000),
            vec![PresentedRange { start: 30000, end: Some(90000) }]
        );
        assert_eq!(list.presented_media_end(600, 30000), Some(90000));
    }

    #[test]
    fn test_parse_v1() {
        let mut data = vec![1, 0, 0, 0, 0, 0, 0, 1];
        data.extend_from_slice(&5000u64.to_be_bytes());
        data.extend_from_slice(&1024i64.to_be_bytes());
        data.extend_from_slice(&0x0001_0000i32.to_be_bytes());
        let list = EditList::parse(&data).unwrap();
        assert_eq!(list.entries[0].segment_duration, 5000);
        assert_eq!(list.entries[0].media_time, 1024);
    }

    #[test]
    fn test_truncated_elst() {
        let mut data = elst_v0(&[(1, 0)]);
        data[7] = 2;
        assert!(EditList::parse(&data).is_none());
    }

    #[test]
    fn test_zero_duration_runs_to_end() {
        let list = EditList::parse(&elst_v0(&[(0, 512)])).unwrap();
        let ranges = list.presented_ranges(1000, 90000);
        assert_eq!(ranges[0].end, None);
        assert!(ranges[0].contains(i64::MAX - 1));
        assert!(!ranges[0].contains(511));
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale(600, 600, 90000), 90000);
        assert_eq!(rescale(u64::MAX, 1, 2), u64::MAX);
        assert_eq!(rescale(5, 0, 10), 0);
    }
}
