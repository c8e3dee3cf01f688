//! MP4/MOV container parsing.
//!
//! Parsing happens in two stages. [`BoxReader::read_tree`] turns the byte
//! source into a [`BoxTree`] without interpreting payloads, then
//! [`Movie::parse`] walks that tree to build tracks and resolve their
//! sample tables into absolute byte ranges.

mod boxes;
mod edit_list;
mod fields;
mod fragment;
mod matrix;
mod metadata;
mod reader;
mod sample_table;
mod track;

pub use boxes::{BoxBody, BoxTree, BoxWalk, ByteRange, FourCc, Mp4Box};
pub use edit_list::{rescale, EditEntry, EditList};
pub use fragment::{parse_trex, FragmentResolver, TrackDefaults};
pub use matrix::{Orientation, TransformMatrix};
pub use metadata::{parse_data_payload, parse_text_atom, MetadataItem, MetadataSource};
pub use reader::{BoxReader, MAX_PAYLOAD_SIZE};
pub use sample_table::{
    ChunkRun, ChunkRuns, PresentedRange, Sample, SampleSizes, SampleTable, SampleTableBuilder,
    TimeRun, TimeRuns, TrackRef,
};
pub use track::{
    CleanAperture, CodecConfig, HandlerType, MediaHeader, PixelAspect, SampleEntryInfo, Track,
    TrackHeader,
};

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use fields::Fields;

/// Seconds between 1904-01-01 and 1970-01-01.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Convert a 1904-based timestamp to UTC. Zero means "not set".
pub fn mac_time_to_utc(seconds: u64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    let unix = i64::try_from(seconds).ok()?.checked_sub(MAC_EPOCH_OFFSET)?;
    DateTime::<Utc>::from_timestamp(unix, 0)
}

/// `ftyp` contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileType {
    pub major_brand: FourCc,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCc>,
}

impl FileType {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut f = Fields::new(data);
        let major_brand = FourCc(f.bytes(4)?.try_into().ok()?);
        let minor_version = f.u32()?;
        let mut compatible_brands = Vec::new();
        while let Some(b) = f.bytes(4) {
            compatible_brands.push(FourCc(b.try_into().ok()?));
        }
        Some(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }

    /// QuickTime (`qt  `) rather than ISO brand.
    pub fn is_quicktime(&self) -> bool {
        self.major_brand.0 == *b"qt  "
    }
}

/// `mvhd` contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MovieHeader {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    /// Duration in movie timescale.
    pub duration: u64,
    pub matrix: TransformMatrix,
    pub next_track_id: u32,
}

impl MovieHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut f = Fields::new(data);
        let (version, _) = f.version_flags()?;
        let creation_time = f.versioned_u64(version)?;
        let modification_time = f.versioned_u64(version)?;
        let timescale = f.u32()?;
        let duration = f.versioned_u64(version)?;
        // rate(4) volume(2) reserved(10)
        f.skip(16)?;
        let matrix = TransformMatrix::from_be_bytes(f.bytes(36)?)?;
        f.skip(24)?;
        let next_track_id = f.u32().unwrap_or(0);
        Some(Self {
            creation_time,
            modification_time,
            timescale,
            duration,
            matrix,
            next_track_id,
        })
    }

    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }
}

/// A parsed movie: headers, tracks and media data regions.
#[derive(Debug, Clone)]
pub struct Movie {
    pub file_size: u64,
    pub file_type: Option<FileType>,
    pub header: MovieHeader,
    pub tracks: Vec<Track>,
    /// Payload ranges of all top-level `mdat` boxes.
    pub media_data: Vec<ByteRange>,
    pub metadata: Vec<MetadataItem>,
    /// Number of `moof` boxes merged into track tables.
    pub fragment_count: usize,
}

impl Movie {
    /// Build tracks and sample tables from a parsed box tree.
    pub fn parse<R: Read + Seek>(reader: &mut BoxReader<R>, tree: &BoxTree) -> Result<Self> {
        let file_type = match tree.top(FourCc::FTYP) {
            Some(ftyp) => FileType::parse(&reader.read_payload(ftyp)?),
            None => None,
        };

        let moov = tree.top(FourCc::MOOV).ok_or(Error::MissingBox("moov"))?;
        let mvhd = moov.child(FourCc::MVHD).ok_or(Error::MissingBox("mvhd"))?;
        let header =
            MovieHeader::parse(&reader.read_payload(mvhd)?).ok_or(Error::MissingBox("mvhd"))?;

        let mut tracks = Vec::new();
        for (i, trak) in moov.children_of(FourCc::TRAK).enumerate() {
            tracks.push(Track::parse(reader, trak, TrackRef(i), header.timescale));
        }

        let metadata = metadata::read_metadata(reader, moov)?;

        let mut movie = Movie {
            file_size: tree.file_size,
            file_type,
            header,
            tracks,
            media_data: tree.media_data_regions(),
            metadata,
            fragment_count: 0,
        };
        movie.merge_fragments(reader, tree, moov);

        debug!(
            tracks = movie.tracks.len(),
            fragments = movie.fragment_count,
            "parsed movie"
        );
        Ok(movie)
    }

    fn merge_fragments<R: Read + Seek>(
        &mut self,
        reader: &mut BoxReader<R>,
        tree: &BoxTree,
        moov: &Mp4Box,
    ) {
        if tree.top(FourCc::MOOF).is_none() {
            return;
        }

        let mut defaults = BTreeMap::new();
        if let Some(mvex) = moov.child(FourCc::MVEX) {
            for trex in mvex.children_of(FourCc::TREX) {
                match reader.read_payload(trex).ok().and_then(|d| parse_trex(&d)) {
                    Some(d) => {
                        defaults.insert(d.track_id, d);
                    }
                    None => warn!("unreadable trex at offset {}", trex.offset),
                }
            }
        }

        let ids: BTreeMap<u32, TrackRef> =
            self.tracks.iter().map(|t| (t.track_id, t.track_ref)).collect();
        let mut resolver = FragmentResolver::new(defaults, &ids, self.file_size);
        for track in &self.tracks {
            if let Ok(table) = &track.sample_table {
                let end = table.last().map_or(0, |s| s.dts + s.duration as u64);
                resolver.set_start_time(track.track_id, end);
            }
        }

        for moof in tree.top_all(FourCc::MOOF) {
            for (track_ref, result) in resolver.resolve(reader, moof) {
                let Some(track) = self.tracks.get_mut(track_ref.0) else {
                    continue;
                };
                match result {
                    Ok(samples) => {
                        if let Ok(table) = &mut track.sample_table {
                            table.extend_from_fragment(samples);
                        }
                    }
                    Err(e) if track.sample_table.is_ok() => track.sample_table = Err(e),
                    Err(_) => {}
                }
            }
            self.fragment_count += 1;
        }

        let timescale = self.header.timescale;
        for track in &mut self.tracks {
            track.apply_edit_list(timescale);
        }
    }

    /// Track by position.
    pub fn track(&self, r: TrackRef) -> Option<&Track> {
        self.tracks.get(r.0)
    }

    /// Video tracks in file order.
    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_video())
    }

    /// Every resolved sample of every track.
    pub fn all_samples(&self) -> impl Iterator<Item = &Sample> {
        self.tracks
            .iter()
            .filter_map(|t| t.samples())
            .flat_map(|table| table.iter())
    }

    pub fn is_fragmented(&self) -> bool {
        self.fragment_count > 0
    }
}
