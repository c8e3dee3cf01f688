//! Movie fragments (`moof/traf`).
//!
//! Fragment runs are resolved into ordinary [`Sample`]s and appended to the
//! track they belong to, so coverage and trim checks see every referenced
//! byte regardless of how the file was muxed.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use tracing::{debug, warn};

use super::boxes::{FourCc, Mp4Box};
use super::fields::Fields;
use super::reader::BoxReader;
use super::sample_table::{Sample, TrackRef, MAX_SAMPLES};
use crate::error::ResolutionError;

const TFHD_BASE_DATA_OFFSET: u32 = 0x01;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x02;
const TFHD_DEFAULT_DURATION: u32 = 0x08;
const TFHD_DEFAULT_SIZE: u32 = 0x10;
const TFHD_DEFAULT_FLAGS: u32 = 0x20;

const TRUN_DATA_OFFSET: u32 = 0x01;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x04;
const TRUN_DURATION: u32 = 0x100;
const TRUN_SIZE: u32 = 0x200;
const TRUN_FLAGS: u32 = 0x400;
const TRUN_CTS_OFFSET: u32 = 0x800;

/// `sample_is_non_sync_sample` bit of the sample flags.
const NON_SYNC_SAMPLE: u32 = 0x0001_0000;

/// Per-track defaults from `mvex/trex`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackDefaults {
    pub track_id: u32,
    pub sample_description_index: u32,
    pub sample_duration: u32,
    pub sample_size: u32,
    pub sample_flags: u32,
}

/// Parse a `trex` payload.
pub fn parse_trex(data: &[u8]) -> Option<TrackDefaults> {
    let mut f = Fields::new(data);
    f.version_flags()?;
    Some(TrackDefaults {
        track_id: f.u32()?,
        sample_description_index: f.u32()?,
        sample_duration: f.u32()?,
        sample_size: f.u32()?,
        sample_flags: f.u32()?,
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct FragmentHeader {
    track_id: u32,
    base_data_offset: Option<u64>,
    sample_duration: Option<u32>,
    sample_size: Option<u32>,
    sample_flags: Option<u32>,
}

fn parse_tfhd(data: &[u8]) -> Option<FragmentHeader> {
    let mut f = Fields::new(data);
    let (_, flags) = f.version_flags()?;
    let mut h = FragmentHeader {
        track_id: f.u32()?,
        ..Default::default()
    };
    if flags & TFHD_BASE_DATA_OFFSET != 0 {
        h.base_data_offset = Some(f.u64()?);
    }
    if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
        f.skip(4)?;
    }
    if flags & TFHD_DEFAULT_DURATION != 0 {
        h.sample_duration = Some(f.u32()?);
    }
    if flags & TFHD_DEFAULT_SIZE != 0 {
        h.sample_size = Some(f.u32()?);
    }
    if flags & TFHD_DEFAULT_FLAGS != 0 {
        h.sample_flags = Some(f.u32()?);
    }
    Some(h)
}

fn parse_tfdt(data: &[u8]) -> Option<u64> {
    let mut f = Fields::new(data);
    let (version, _) = f.version_flags()?;
    f.versioned_u64(version)
}

/// Per-sample fields of one `trun` entry, defaults not yet applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RunEntry {
    duration: Option<u32>,
    size: Option<u32>,
    flags: Option<u32>,
    cts_offset: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TrackRun {
    data_offset: Option<i32>,
    first_sample_flags: Option<u32>,
    entries: Vec<RunEntry>,
}

fn parse_trun(data: &[u8]) -> Result<TrackRun, String> {
    let mut f = Fields::new(data);
    let (version, flags) = f.version_flags().ok_or("trun too short")?;
    let count = f.u32().ok_or("trun too short")?;
    let mut run = TrackRun::default();
    if flags & TRUN_DATA_OFFSET != 0 {
        run.data_offset = Some(f.i32().ok_or("trun too short")?);
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        run.first_sample_flags = Some(f.u32().ok_or("trun too short")?);
    }

    let per_sample = [TRUN_DURATION, TRUN_SIZE, TRUN_FLAGS, TRUN_CTS_OFFSET]
        .iter()
        .filter(|&&bit| flags & bit != 0)
        .count()
        * 4;
    if count as u64 > MAX_SAMPLES || (count as usize).saturating_mul(per_sample) > f.remaining() {
        return Err(format!(
            "trun declares {} samples, payload holds {}",
            count,
            f.remaining().checked_div(per_sample).unwrap_or(0)
        ));
    }

    run.entries.reserve(count as usize);
    for _ in 0..count {
        let mut entry = RunEntry::default();
        if flags & TRUN_DURATION != 0 {
            entry.duration = f.u32();
        }
        if flags & TRUN_SIZE != 0 {
            entry.size = f.u32();
        }
        if flags & TRUN_FLAGS != 0 {
            entry.flags = f.u32();
        }
        if flags & TRUN_CTS_OFFSET != 0 {
            let raw = f.u32().ok_or("trun too short")?;
            // Version 0 offsets are unsigned, version 1 signed.
            entry.cts_offset = if version == 0 {
                raw.min(i32::MAX as u32) as i32
            } else {
                raw as i32
            };
        }
        run.entries.push(entry);
    }
    Ok(run)
}

/// Resolves fragments in file order, carrying decode time across them.
pub struct FragmentResolver<'a> {
    defaults: BTreeMap<u32, TrackDefaults>,
    tracks: &'a BTreeMap<u32, TrackRef>,
    next_dts: BTreeMap<u32, u64>,
    file_size: u64,
}

impl<'a> FragmentResolver<'a> {
    pub fn new(
        defaults: BTreeMap<u32, TrackDefaults>,
        tracks: &'a BTreeMap<u32, TrackRef>,
        file_size: u64,
    ) -> Self {
        Self {
            defaults,
            tracks,
            next_dts: BTreeMap::new(),
            file_size,
        }
    }

    /// Seed the decode time a track's first fragment continues from.
    pub fn set_start_time(&mut self, track_id: u32, dts: u64) {
        self.next_dts.insert(track_id, dts);
    }

    /// Resolve one `moof` into samples per track.
    ///
    /// Sample indices are provisional; the caller renumbers them when
    /// appending to the track's table. A `traf` that cannot be read fails
    /// only its own track.
    pub fn resolve<R: Read + Seek>(
        &mut self,
        reader: &mut BoxReader<R>,
        moof: &Mp4Box,
    ) -> Vec<(TrackRef, Result<Vec<Sample>, ResolutionError>)> {
        let mut out = Vec::new();

        for traf in moof.children_of(FourCc::TRAF) {
            let Some(tfhd) = traf.child(FourCc::TFHD) else {
                warn!("traf without tfhd at offset {}", traf.offset);
                continue;
            };
            let Some(header) = reader.read_payload(tfhd).ok().and_then(|d| parse_tfhd(&d)) else {
                warn!("unreadable tfhd at offset {}", tfhd.offset);
                continue;
            };
            let track_id = header.track_id;
            let Some(&track_ref) = self.tracks.get(&track_id) else {
                warn!(track_id, "fragment references unknown track");
                continue;
            };

            let mut runs = Vec::new();
            let mut failure = None;
            for trun in traf.children_of(FourCc::TRUN) {
                let parsed = reader
                    .read_payload(trun)
                    .map_err(|e| format!("unreadable trun at offset {}: {}", trun.offset, e))
                    .and_then(|data| parse_trun(&data));
                match parsed {
                    Ok(run) => runs.push(run),
                    Err(message) => {
                        failure = Some(ResolutionError::new(track_id, message));
                        break;
                    }
                }
            }
            if let Some(err) = failure {
                out.push((track_ref, Err(err)));
                continue;
            }

            let carried = self.next_dts.get(&track_id).copied().unwrap_or(0);
            let mut dts = traf
                .child(FourCc::TFDT)
                .and_then(|tfdt| reader.read_payload(tfdt).ok())
                .and_then(|data| parse_tfdt(&data))
                .unwrap_or(carried);

            let result = self.expand(&header, &runs, moof.offset, track_ref, &mut dts);
            self.next_dts.insert(track_id, dts);
            if let Ok(samples) = &result {
                debug!(track_id, samples = samples.len(), "resolved fragment at offset {}", moof.offset);
            }
            out.push((track_ref, result));
        }

        out
    }

    fn expand(
        &self,
        header: &FragmentHeader,
        runs: &[TrackRun],
        moof_offset: u64,
        track_ref: TrackRef,
        dts: &mut u64,
    ) -> Result<Vec<Sample>, ResolutionError> {
        let track_id = header.track_id;
        let defaults = self.defaults.get(&track_id).copied().unwrap_or_default();
        let base = header.base_data_offset.unwrap_or(moof_offset);
        let mut cursor = base;
        let mut samples = Vec::new();

        for run in runs {
            if let Some(rel) = run.data_offset {
                cursor = base.checked_add_signed(rel as i64).ok_or_else(|| {
                    ResolutionError::new(track_id, format!("trun data offset {} underflows", rel))
                })?;
            }
            for (i, entry) in run.entries.iter().enumerate() {
                let duration = entry
                    .duration
                    .or(header.sample_duration)
                    .unwrap_or(defaults.sample_duration);
                let size = entry.size.or(header.sample_size).unwrap_or(defaults.sample_size);
                let flags = if i == 0 && run.first_sample_flags.is_some() {
                    run.first_sample_flags
                } else {
                    entry.flags
                }
                .or(header.sample_flags)
                .unwrap_or(defaults.sample_flags);

                let end = cursor
                    .checked_add(size as u64)
                    .filter(|&end| end <= self.file_size)
                    .ok_or_else(|| {
                        ResolutionError::new(
                            track_id,
                            format!(
                                "fragment sample at offset {} (+{}) extends past end of file",
                                cursor, size
                            ),
                        )
                    })?;

                samples.push(Sample {
                    index: samples.len() as u32 + 1,
                    offset: cursor,
                    size,
                    dts: *dts,
                    duration,
                    cts_offset: entry.cts_offset,
                    is_sync: flags & NON_SYNC_SAMPLE == 0,
                    presented: true,
                    track: track_ref,
                });
                cursor = end;
                *dts += duration as u64;
            }
        }

        Ok(samples)
    }
}
