//! Track-level headers and sample description.

use std::io::{Read, Seek};

use serde::Serialize;
use tracing::{debug, warn};

use super::boxes::{BoxBody, ByteRange, FourCc, Mp4Box};
use super::edit_list::EditList;
use super::fields::Fields;
use super::matrix::TransformMatrix;
use super::reader::BoxReader;
use super::sample_table::{self, SampleTable, SampleTableBuilder, TrackRef};
use crate::error::ResolutionError;

/// Track handler type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerType {
    Video,
    Audio,
    Text,
    Metadata,
    Timecode,
    Hint,
    Other(FourCc),
}

impl From<FourCc> for HandlerType {
    fn from(code: FourCc) -> Self {
        match &code.0 {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"text" | b"sbtl" | b"subt" | b"clcp" => Self::Text,
            b"meta" | b"mdta" | b"mdir" => Self::Metadata,
            b"tmcd" => Self::Timecode,
            b"hint" => Self::Hint,
            _ => Self::Other(code),
        }
    }
}

/// Fields of `tkhd`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackHeader {
    pub version: u8,
    pub flags: u32,
    /// Seconds since 1904-01-01.
    pub creation_time: u64,
    /// Seconds since 1904-01-01.
    pub modification_time: u64,
    pub track_id: u32,
    /// Duration in movie timescale.
    pub duration: u64,
    pub matrix: TransformMatrix,
    /// Declared presentation width (16.16).
    pub width: f64,
    /// Declared presentation height (16.16).
    pub height: f64,
}

impl TrackHeader {
    /// Enabled flag (bit 0).
    pub fn is_enabled(&self) -> bool {
        self.flags & 1 != 0
    }

    /// Declared dimensions rounded to whole pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width.round() as u32, self.height.round() as u32)
    }
}

/// Fields of `mdhd`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaHeader {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    /// Duration in media timescale.
    pub duration: u64,
    /// ISO-639-2/T code, or empty.
    pub language: String,
}

/// Codec configuration record found in a sample entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodecConfig {
    /// Box type (`avcC`, `hvcC`, ...).
    pub box_type: FourCc,
    /// Location of the record.
    pub range: ByteRange,
    /// Record bytes.
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// `clap` clean aperture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CleanAperture {
    pub width: f64,
    pub height: f64,
    pub horizontal_offset: f64,
    pub vertical_offset: f64,
}

/// `pasp` pixel aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelAspect {
    pub h_spacing: u32,
    pub v_spacing: u32,
}

/// First sample description of a track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleEntryInfo {
    /// Entry format (`avc1`, `hvc1`, `mp4a`, ...).
    pub format: FourCc,
    /// Visual width, when the entry is visual.
    pub width: Option<u16>,
    /// Visual height, when the entry is visual.
    pub height: Option<u16>,
    /// Compressor name from the visual entry.
    pub compressor: Option<String>,
    pub codec_config: Option<CodecConfig>,
    pub clean_aperture: Option<CleanAperture>,
    /// Pixel aspect ratio (`pasp`).
    pub pixel_aspect: Option<PixelAspect>,
    /// Number of descriptions in `stsd`.
    pub description_count: usize,
}

/// A track with its headers and resolved samples.
#[derive(Debug, Clone)]
pub struct Track {
    /// Position in the movie's track list.
    pub track_ref: TrackRef,
    pub track_id: u32,
    pub handler: HandlerType,
    pub handler_name: String,
    pub header: TrackHeader,
    pub media: MediaHeader,
    pub sample_entry: Option<SampleEntryInfo>,
    pub edit_list: Option<EditList>,
    /// Resolved samples, or why they could not be resolved.
    pub sample_table: Result<SampleTable, ResolutionError>,
    /// Location of the `trak` box.
    pub range: ByteRange,
}

impl Track {
    pub fn is_video(&self) -> bool {
        self.handler == HandlerType::Video
    }

    /// Sample-entry format code.
    pub fn format(&self) -> Option<FourCc> {
        self.sample_entry.as_ref().map(|e| e.format)
    }

    /// Sample-entry dimensions, when visual.
    pub fn entry_dimensions(&self) -> Option<(u32, u32)> {
        let entry = self.sample_entry.as_ref()?;
        Some((entry.width? as u32, entry.height? as u32))
    }

    /// Samples, when resolution succeeded.
    pub fn samples(&self) -> Option<&SampleTable> {
        self.sample_table.as_ref().ok()
    }

    /// Recompute each sample's `presented` flag from the edit list.
    pub fn apply_edit_list(&mut self, movie_timescale: u32) {
        let (Some(list), Ok(table)) = (&self.edit_list, &mut self.sample_table) else {
            return;
        };
        let ranges = list.presented_ranges(movie_timescale, self.media.timescale);
        table.apply_presentation(&ranges);
    }

    /// Parse a `trak` box.
    ///
    /// Unreadable boxes and table inconsistencies are stored in
    /// [`Track::sample_table`] so the remaining tracks still resolve.
    pub fn parse<R: Read + Seek>(
        reader: &mut BoxReader<R>,
        trak: &Mp4Box,
        track_ref: TrackRef,
        movie_timescale: u32,
    ) -> Self {
        let mut track = Track {
            track_ref,
            track_id: 0,
            handler: HandlerType::Other(FourCc(*b"    ")),
            handler_name: String::new(),
            header: TrackHeader::default(),
            media: MediaHeader::default(),
            sample_entry: None,
            edit_list: None,
            sample_table: Ok(SampleTable::default()),
            range: trak.range(),
        };

        if let Err(e) = track.read_boxes(reader, trak, movie_timescale) {
            track.sample_table = Err(e);
        }

        match &track.sample_table {
            Ok(table) => debug!(
                track_id = track.track_id,
                samples = table.len(),
                handler = ?track.handler,
                "resolved track"
            ),
            Err(e) => warn!("{}", e),
        }

        track
    }

    fn read_boxes<R: Read + Seek>(
        &mut self,
        reader: &mut BoxReader<R>,
        trak: &Mp4Box,
        movie_timescale: u32,
    ) -> Result<(), ResolutionError> {
        let tkhd = trak
            .child(FourCc::TKHD)
            .ok_or_else(|| ResolutionError::new(0, "missing tkhd"))?;
        let header = parse_tkhd(&read_box(reader, tkhd, 0)?)
            .ok_or_else(|| ResolutionError::new(0, "tkhd too short"))?;
        self.track_id = header.track_id;
        self.header = header;
        let track_id = self.track_id;

        if let Some(elst) = trak.find(&[FourCc::EDTS, FourCc::ELST]) {
            self.edit_list = EditList::parse(&read_box(reader, elst, track_id)?);
            if self.edit_list.is_none() {
                warn!(track_id, "unreadable elst at offset {}", elst.offset);
            }
        }

        let mdia = trak
            .child(FourCc::MDIA)
            .ok_or_else(|| ResolutionError::new(track_id, "missing mdia"))?;
        if let Some(mdhd) = mdia.child(FourCc::MDHD) {
            if let Some(media) = parse_mdhd(&read_box(reader, mdhd, track_id)?) {
                self.media = media;
            }
        }
        if let Some(hdlr) = mdia.child(FourCc::HDLR) {
            if let Some((handler, name)) = parse_hdlr(&read_box(reader, hdlr, track_id)?) {
                self.handler = handler;
                self.handler_name = name;
            }
        }

        let stbl = mdia
            .find(&[FourCc::MINF, FourCc::STBL])
            .ok_or_else(|| ResolutionError::new(track_id, "missing stbl"))?;

        if let Some(stsd) = stbl.child(FourCc::STSD) {
            self.sample_entry = parse_sample_entry(reader, stsd, track_id)?;
        }

        self.sample_table = Ok(resolve_sample_table(reader, stbl, track_id, self.track_ref)?);
        self.apply_edit_list(movie_timescale);
        Ok(())
    }
}

/// Read a box payload, turning any failure into an error for this track.
fn read_box<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    b: &Mp4Box,
    track_id: u32,
) -> Result<Vec<u8>, ResolutionError> {
    reader.read_payload(b).map_err(|e| {
        ResolutionError::new(
            track_id,
            format!("unreadable {} at offset {}: {}", b.box_type, b.offset, e),
        )
    })
}

fn resolve_sample_table<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    stbl: &Mp4Box,
    track_id: u32,
    track_ref: TrackRef,
) -> Result<SampleTable, ResolutionError> {
    let fail = |m: String| Err(ResolutionError::new(track_id, m));
    let mut builder = SampleTableBuilder::new();

    let mut have_sizes = false;
    let mut have_offsets = false;

    for child in stbl.children() {
        let table_box = matches!(
            child.box_type,
            FourCc::STTS
                | FourCc::CTTS
                | FourCc::STSS
                | FourCc::STSC
                | FourCc::STSZ
                | FourCc::STZ2
                | FourCc::STCO
                | FourCc::CO64
        );
        if !table_box {
            continue;
        }
        let data = read_box(reader, child, track_id)?;
        let parsed = match child.box_type {
            FourCc::STTS => sample_table::parse_stts(&data).map(|v| builder.set_time_to_sample(v)),
            FourCc::CTTS => {
                sample_table::parse_ctts(&data).map(|v| builder.set_composition_offsets(v))
            }
            FourCc::STSS => sample_table::parse_stss(&data).map(|v| builder.set_sync_samples(v)),
            FourCc::STSC => sample_table::parse_stsc(&data).map(|v| builder.set_sample_to_chunk(v)),
            FourCc::STSZ => {
                have_sizes = true;
                sample_table::parse_stsz(&data).map(|v| builder.set_sizes(v))
            }
            FourCc::STZ2 => {
                have_sizes = true;
                sample_table::parse_stz2(&data).map(|v| builder.set_sizes(v))
            }
            FourCc::STCO => {
                have_offsets = true;
                sample_table::parse_stco(&data).map(|v| builder.set_chunk_offsets(v))
            }
            _ => {
                have_offsets = true;
                sample_table::parse_co64(&data).map(|v| builder.set_chunk_offsets(v))
            }
        };
        if let Err(message) = parsed {
            return fail(message);
        }
    }

    if !have_sizes {
        return fail("missing stsz".to_string());
    }
    if !have_offsets {
        return fail("missing stco/co64".to_string());
    }

    builder.build(track_id, track_ref, reader.file_size())
}

/// Parse a `tkhd` payload.
pub fn parse_tkhd(data: &[u8]) -> Option<TrackHeader> {
    let mut f = Fields::new(data);
    let (version, flags) = f.version_flags()?;
    let creation_time = f.versioned_u64(version)?;
    let modification_time = f.versioned_u64(version)?;
    let track_id = f.u32()?;
    f.skip(4)?;
    let duration = f.versioned_u64(version)?;
    // reserved(8) layer(2) alternate_group(2) volume(2) reserved(2)
    f.skip(16)?;
    let matrix = TransformMatrix::from_be_bytes(f.bytes(36)?)?;
    let width = f.u32()? as f64 / 65536.0;
    let height = f.u32()? as f64 / 65536.0;
    Some(TrackHeader {
        version,
        flags,
        creation_time,
        modification_time,
        track_id,
        duration,
        matrix,
        width,
        height,
    })
}

/// Parse an `mdhd` payload.
pub fn parse_mdhd(data: &[u8]) -> Option<MediaHeader> {
    let mut f = Fields::new(data);
    let (version, _) = f.version_flags()?;
    let creation_time = f.versioned_u64(version)?;
    let modification_time = f.versioned_u64(version)?;
    let timescale = f.u32()?;
    let duration = f.versioned_u64(version)?;
    let packed = f.u16().unwrap_or(0);
    Some(MediaHeader {
        creation_time,
        modification_time,
        timescale,
        duration,
        language: unpack_language(packed),
    })
}

fn unpack_language(packed: u16) -> String {
    if packed == 0 || packed == 0x7FFF {
        return String::new();
    }
    // Values below 0x400 are Macintosh language codes.
    if packed < 0x400 {
        return String::new();
    }
    (0..3)
        .rev()
        .map(|i| (((packed >> (i * 5)) & 0x1F) as u8 + 0x60) as char)
        .collect()
}

/// Parse an `hdlr` payload into handler type and name.
pub fn parse_hdlr(data: &[u8]) -> Option<(HandlerType, String)> {
    let mut f = Fields::new(data);
    f.version_flags()?;
    f.skip(4)?;
    let code = FourCc(f.bytes(4)?.try_into().ok()?);
    f.skip(12)?;
    let name = decode_name(f.rest());
    Some((HandlerType::from(code), name))
}

/// Handler names are C strings (ISO) or Pascal strings (QuickTime).
fn decode_name(raw: &[u8]) -> String {
    let bytes = match raw.first() {
        Some(&len) if len as usize == raw.len() - 1 && len > 0 => &raw[1..],
        _ => raw,
    };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

fn parse_sample_entry<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    stsd: &Mp4Box,
    track_id: u32,
) -> Result<Option<SampleEntryInfo>, ResolutionError> {
    let description_count = stsd.children().len();
    let Some(entry) = stsd.children().first() else {
        return Ok(None);
    };

    let mut info = SampleEntryInfo {
        format: entry.box_type,
        width: None,
        height: None,
        compressor: None,
        codec_config: None,
        clean_aperture: None,
        pixel_aspect: None,
        description_count,
    };

    let BoxBody::SampleEntry { fields, children } = &entry.body else {
        return Ok(Some(info));
    };

    if fields.length == 78 {
        let data = reader.read_range(*fields).map_err(|e| {
            ResolutionError::new(
                track_id,
                format!("unreadable {} at offset {}: {}", entry.box_type, entry.offset, e),
            )
        })?;
        let mut f = Fields::new(&data);
        if f.skip(24).is_some() {
            info.width = f.u16();
            info.height = f.u16();
        }
        if let Some(name) = data.get(42..74) {
            let len = (name[0] as usize).min(31);
            let text = String::from_utf8_lossy(&name[1..1 + len]).trim().to_string();
            info.compressor = (!text.is_empty()).then_some(text);
        }
    }

    for child in children {
        match child.box_type {
            FourCc::AVCC | FourCc::HVCC => {
                let data = read_box(reader, child, track_id)?;
                info.codec_config = Some(CodecConfig {
                    box_type: child.box_type,
                    range: child.payload(),
                    data,
                });
            }
            FourCc::CLAP => {
                let data = read_box(reader, child, track_id)?;
                info.clean_aperture = parse_clap(&data);
            }
            FourCc::PASP => {
                let data = read_box(reader, child, track_id)?;
                let mut f = Fields::new(&data);
                if let (Some(h_spacing), Some(v_spacing)) = (f.u32(), f.u32()) {
                    info.pixel_aspect = Some(PixelAspect {
                        h_spacing,
                        v_spacing,
                    });
                }
            }
            _ => {}
        }
    }

    Ok(Some(info))
}

fn parse_clap(data: &[u8]) -> Option<CleanAperture> {
    let mut f = Fields::new(data);
    let mut ratio = || -> Option<f64> {
        let n = f.i32()? as f64;
        let d = f.u32()? as f64;
        (d != 0.0).then(|| n / d)
    };
    Some(CleanAperture {
        width: ratio()?,
        height: ratio()?,
        horizontal_offset: ratio()?,
        vertical_offset: ratio()?,
    })
}
