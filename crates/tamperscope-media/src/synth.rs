//! Synthetic MP4 writer used to build test fixtures.
//!
//! Files are laid out as `ftyp`, `mdat`, `moov` so that every chunk offset is
//! known before the sample tables are written. Each sample is its own chunk.
//! Arbitrary unreferenced bytes can be placed between samples with
//! [`MdatItem::Raw`]. Movie fragments ([`FragmentSpec`]) follow `moov` as
//! `moof` + `mdat` pairs.

use crate::mp4::{EditEntry, TransformMatrix};

/// One sample to store.
#[derive(Debug, Clone, Default)]
pub struct SynthSample {
    pub data: Vec<u8>,
    pub sync: bool,
    pub cts_offset: i32,
}

impl SynthSample {
    pub fn new(data: Vec<u8>, sync: bool) -> Self {
        Self {
            data,
            sync,
            cts_offset: 0,
        }
    }
}

/// Description of a track to write.
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub track_id: u32,
    /// Handler code (`vide`, `soun`).
    pub handler: [u8; 4],
    /// Sample entry format (`avc1`, `hvc1`, `mp4a`).
    pub format: [u8; 4],
    /// Codec configuration child box, e.g. `(*b"avcC", record)`.
    pub config: Option<([u8; 4], Vec<u8>)>,
    /// Sample entry width/height.
    pub width: u16,
    pub height: u16,
    /// `tkhd` width/height in whole pixels.
    pub display_width: u32,
    pub display_height: u32,
    pub matrix: TransformMatrix,
    pub timescale: u32,
    pub sample_duration: u32,
    pub samples: Vec<SynthSample>,
    /// Written as `edts/elst` when present.
    pub edit_list: Option<Vec<EditEntry>>,
    /// Write `ctts` from the samples' composition offsets.
    pub write_ctts: bool,
    /// Write `stss`; otherwise every sample is sync.
    pub write_stss: bool,
    pub creation_time: u64,
    pub modification_time: u64,
    /// `tkhd` duration in movie timescale, overriding the one derived from
    /// the samples and edit list.
    pub declared_duration: Option<u64>,
}

impl TrackSpec {
    /// A video track with identity matrix and matching display size.
    pub fn video(track_id: u32, format: [u8; 4], width: u16, height: u16) -> Self {
        Self {
            track_id,
            handler: *b"vide",
            format,
            config: None,
            width,
            height,
            display_width: width as u32,
            display_height: height as u32,
            matrix: TransformMatrix::IDENTITY,
            timescale: 30000,
            sample_duration: 1000,
            samples: Vec::new(),
            edit_list: None,
            write_ctts: false,
            write_stss: true,
            creation_time: 0,
            modification_time: 0,
            declared_duration: None,
        }
    }

    /// An audio track (`mp4a`) at 44.1 kHz with 1024-sample frames.
    pub fn audio(track_id: u32) -> Self {
        Self {
            handler: *b"soun",
            format: *b"mp4a",
            width: 0,
            height: 0,
            display_width: 0,
            display_height: 0,
            timescale: 44100,
            sample_duration: 1024,
            write_stss: false,
            ..Self::video(track_id, *b"mp4a", 0, 0)
        }
    }

}

/// One movie fragment: a `moof` with a single `traf`, followed by an `mdat`
/// holding the fragment's samples and then `trailing`.
#[derive(Debug, Clone, Default)]
pub struct FragmentSpec {
    /// Track position (0-based) the samples belong to.
    pub track: usize,
    pub samples: Vec<SynthSample>,
    /// Bytes after the samples that no `trun` references.
    pub trailing: Vec<u8>,
}

impl FragmentSpec {
    pub fn new(track: usize, samples: Vec<SynthSample>) -> Self {
        Self {
            track,
            samples,
            trailing: Vec::new(),
        }
    }
}

/// An element of the `mdat` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdatItem {
    /// Sample `index` (0-based) of track `track` (0-based position).
    Sample { track: usize, index: usize },
    /// Bytes not referenced by any table.
    Raw(Vec<u8>),
}

/// Builder for a complete MP4 file.
#[derive(Debug, Clone)]
pub struct Mp4Builder {
    movie_timescale: u32,
    movie_matrix: TransformMatrix,
    tracks: Vec<TrackSpec>,
    layout: Option<Vec<MdatItem>>,
    fragments: Vec<FragmentSpec>,
    udta: Vec<([u8; 4], String)>,
    creation_time: u64,
    modification_time: u64,
    major_brand: [u8; 4],
}

impl Default for Mp4Builder {
    fn default() -> Self {
        Self::new(600)
    }
}

impl Mp4Builder {
    pub fn new(movie_timescale: u32) -> Self {
        Self {
            movie_timescale,
            movie_matrix: TransformMatrix::IDENTITY,
            tracks: Vec::new(),
            layout: None,
            fragments: Vec::new(),
            udta: Vec::new(),
            creation_time: 0,
            modification_time: 0,
            major_brand: *b"qt  ",
        }
    }

    pub fn track(mut self, spec: TrackSpec) -> Self {
        self.tracks.push(spec);
        self
    }

    pub fn movie_matrix(mut self, matrix: TransformMatrix) -> Self {
        self.movie_matrix = matrix;
        self
    }

    pub fn times(mut self, creation: u64, modification: u64) -> Self {
        self.creation_time = creation;
        self.modification_time = modification;
        self
    }

    pub fn brand(mut self, brand: [u8; 4]) -> Self {
        self.major_brand = brand;
        self
    }

    /// Add a QuickTime text atom to `moov/udta`.
    pub fn udta_text(mut self, tag: [u8; 4], text: &str) -> Self {
        self.udta.push((tag, text.to_string()));
        self
    }

    /// Explicit `mdat` layout. Samples left out are appended in track order.
    pub fn layout(mut self, items: Vec<MdatItem>) -> Self {
        self.layout = Some(items);
        self
    }

    /// Append a movie fragment after `moov`.
    pub fn fragment(mut self, fragment: FragmentSpec) -> Self {
        self.fragments.push(fragment);
        self
    }

    /// Samples of track `t` in `moov` and in every fragment.
    fn sample_count(&self, t: usize) -> u64 {
        let in_moov = self.tracks.get(t).map_or(0, |spec| spec.samples.len());
        let in_fragments: usize = self
            .fragments
            .iter()
            .filter(|f| f.track == t)
            .map(|f| f.samples.len())
            .sum();
        (in_moov + in_fragments) as u64
    }

    /// Media-timescale duration of track `t`.
    fn media_duration(&self, t: usize) -> u64 {
        let duration = self.tracks.get(t).map_or(0, |spec| spec.sample_duration);
        self.sample_count(t) * duration as u64
    }

    /// Movie-timescale duration of track `t`.
    fn track_duration(&self, t: usize) -> u64 {
        let Some(spec) = self.tracks.get(t) else {
            return 0;
        };
        if let Some(duration) = spec.declared_duration {
            return duration;
        }
        match &spec.edit_list {
            Some(edits) => edits.iter().map(|e| e.segment_duration).sum(),
            None => crate::mp4::rescale(self.media_duration(t), spec.timescale, self.movie_timescale),
        }
    }

    /// Write the file.
    pub fn build(&self) -> Vec<u8> {
        let ftyp = {
            let mut p = self.major_brand.to_vec();
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&self.major_brand);
            p.extend_from_slice(b"isom");
            boxed(b"ftyp", &p)
        };

        let mut items = self.layout.clone().unwrap_or_default();
        for (t, track) in self.tracks.iter().enumerate() {
            for i in 0..track.samples.len() {
                let item = MdatItem::Sample { track: t, index: i };
                if !items.contains(&item) {
                    items.push(item);
                }
            }
        }

        let mdat_payload_start = ftyp.len() as u64 + 8;
        let mut mdat = Vec::new();
        let mut offsets: Vec<Vec<u64>> = self.tracks.iter().map(|t| vec![0; t.samples.len()]).collect();
        for item in &items {
            match item {
                MdatItem::Sample { track, index } => {
                    let Some(sample) = self.tracks.get(*track).and_then(|t| t.samples.get(*index)) else {
                        continue;
                    };
                    offsets[*track][*index] = mdat_payload_start + mdat.len() as u64;
                    mdat.extend_from_slice(&sample.data);
                }
                MdatItem::Raw(bytes) => mdat.extend_from_slice(bytes),
            }
        }

        let mut moov_payload = self.mvhd();
        for (t, track) in self.tracks.iter().enumerate() {
            moov_payload.extend(self.trak(t, track, &offsets[t]));
        }
        if !self.fragments.is_empty() {
            let mut mvex = Vec::new();
            for track in &self.tracks {
                let mut trex = track.track_id.to_be_bytes().to_vec();
                for v in [1u32, track.sample_duration, 0, 0] {
                    trex.extend_from_slice(&v.to_be_bytes());
                }
                mvex.extend(full_box(b"trex", 0, 0, &trex));
            }
            moov_payload.extend(boxed(b"mvex", &mvex));
        }
        if !self.udta.is_empty() {
            let mut udta = Vec::new();
            for (tag, text) in &self.udta {
                let mut p = (text.len() as u16).to_be_bytes().to_vec();
                p.extend_from_slice(&0x15C7u16.to_be_bytes());
                p.extend_from_slice(text.as_bytes());
                udta.extend(boxed(tag, &p));
            }
            moov_payload.extend(boxed(b"udta", &udta));
        }

        let mut out = ftyp;
        out.extend(boxed(b"mdat", &mdat));
        out.extend(boxed(b"moov", &moov_payload));

        let mut decoded: Vec<u64> = self.tracks.iter().map(|t| t.samples.len() as u64).collect();
        for (sequence, fragment) in self.fragments.iter().enumerate() {
            let Some(track) = self.tracks.get(fragment.track) else {
                continue;
            };
            let base_time = decoded[fragment.track] * track.sample_duration as u64;
            decoded[fragment.track] += fragment.samples.len() as u64;

            // The moof's size does not depend on the run's data offset.
            let sized = moof(sequence as u32 + 1, track, fragment, base_time, 0);
            let data_offset = sized.len() as i32 + 8;
            out.extend(moof(sequence as u32 + 1, track, fragment, base_time, data_offset));

            let mut payload: Vec<u8> = fragment.samples.iter().flat_map(|s| s.data.clone()).collect();
            payload.extend_from_slice(&fragment.trailing);
            out.extend(boxed(b"mdat", &payload));
        }
        out
    }

    fn mvhd(&self) -> Vec<u8> {
        let duration = (0..self.tracks.len())
            .map(|t| self.track_duration(t))
            .max()
            .unwrap_or(0);
        let mut p = Vec::new();
        p.extend_from_slice(&(self.creation_time as u32).to_be_bytes());
        p.extend_from_slice(&(self.modification_time as u32).to_be_bytes());
        p.extend_from_slice(&self.movie_timescale.to_be_bytes());
        p.extend_from_slice(&(duration as u32).to_be_bytes());
        p.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        p.extend_from_slice(&0x0100u16.to_be_bytes());
        p.extend_from_slice(&[0; 10]);
        p.extend_from_slice(&self.movie_matrix.to_be_bytes());
        p.extend_from_slice(&[0; 24]);
        p.extend_from_slice(&(self.tracks.len() as u32 + 1).to_be_bytes());
        full_box(b"mvhd", 0, 0, &p)
    }

    fn trak(&self, position: usize, t: &TrackSpec, offsets: &[u64]) -> Vec<u8> {
        let mut tkhd = Vec::new();
        tkhd.extend_from_slice(&(t.creation_time as u32).to_be_bytes());
        tkhd.extend_from_slice(&(t.modification_time as u32).to_be_bytes());
        tkhd.extend_from_slice(&t.track_id.to_be_bytes());
        tkhd.extend_from_slice(&[0; 4]);
        tkhd.extend_from_slice(&(self.track_duration(position) as u32).to_be_bytes());
        tkhd.extend_from_slice(&[0; 8]);
        tkhd.extend_from_slice(&[0; 4]);
        let volume: u16 = if &t.handler == b"soun" { 0x0100 } else { 0 };
        tkhd.extend_from_slice(&volume.to_be_bytes());
        tkhd.extend_from_slice(&[0; 2]);
        tkhd.extend_from_slice(&t.matrix.to_be_bytes());
        tkhd.extend_from_slice(&(t.display_width << 16).to_be_bytes());
        tkhd.extend_from_slice(&(t.display_height << 16).to_be_bytes());

        let mut trak = full_box(b"tkhd", 0, 3, &tkhd);

        if let Some(edits) = &t.edit_list {
            let mut elst = (edits.len() as u32).to_be_bytes().to_vec();
            for e in edits {
                elst.extend_from_slice(&(e.segment_duration as u32).to_be_bytes());
                elst.extend_from_slice(&(e.media_time as i32).to_be_bytes());
                elst.extend_from_slice(&e.media_rate.to_be_bytes());
            }
            trak.extend(boxed(b"edts", &full_box(b"elst", 0, 0, &elst)));
        }

        let mut mdhd = Vec::new();
        mdhd.extend_from_slice(&(t.creation_time as u32).to_be_bytes());
        mdhd.extend_from_slice(&(t.modification_time as u32).to_be_bytes());
        mdhd.extend_from_slice(&t.timescale.to_be_bytes());
        mdhd.extend_from_slice(&(self.media_duration(position) as u32).to_be_bytes());
        mdhd.extend_from_slice(&0x55C4u16.to_be_bytes());
        mdhd.extend_from_slice(&[0; 2]);

        let mut hdlr = vec![0; 4];
        hdlr.extend_from_slice(&t.handler);
        hdlr.extend_from_slice(&[0; 12]);
        hdlr.extend_from_slice(b"Core Media\0");

        let media_header = if &t.handler == b"vide" {
            full_box(b"vmhd", 0, 1, &[0; 8])
        } else {
            full_box(b"smhd", 0, 0, &[0; 4])
        };
        let dref = full_box(b"dref", 0, 0, &{
            let mut p = 1u32.to_be_bytes().to_vec();
            p.extend(full_box(b"url ", 0, 1, &[]));
            p
        });

        let mut minf = media_header;
        minf.extend(boxed(b"dinf", &dref));
        minf.extend(boxed(b"stbl", &self.stbl(t, offsets)));

        let mut mdia = full_box(b"mdhd", 0, 0, &mdhd);
        mdia.extend(full_box(b"hdlr", 0, 0, &hdlr));
        mdia.extend(boxed(b"minf", &minf));

        trak.extend(boxed(b"mdia", &mdia));
        boxed(b"trak", &trak)
    }

    fn stbl(&self, t: &TrackSpec, offsets: &[u64]) -> Vec<u8> {
        let n = t.samples.len() as u32;

        let mut stsd = 1u32.to_be_bytes().to_vec();
        stsd.extend(sample_entry(t));
        let mut stbl = full_box(b"stsd", 0, 0, &stsd);

        let mut stts = Vec::new();
        if n > 0 {
            stts.extend_from_slice(&1u32.to_be_bytes());
            stts.extend_from_slice(&n.to_be_bytes());
            stts.extend_from_slice(&t.sample_duration.to_be_bytes());
        } else {
            stts.extend_from_slice(&0u32.to_be_bytes());
        }
        stbl.extend(full_box(b"stts", 0, 0, &stts));

        if t.write_ctts {
            let mut ctts = n.to_be_bytes().to_vec();
            for s in &t.samples {
                ctts.extend_from_slice(&1u32.to_be_bytes());
                ctts.extend_from_slice(&s.cts_offset.to_be_bytes());
            }
            stbl.extend(full_box(b"ctts", 0, 0, &ctts));
        }

        if t.write_stss {
            let sync: Vec<u32> = t
                .samples
                .iter()
                .enumerate()
                .filter(|(_, s)| s.sync)
                .map(|(i, _)| i as u32 + 1)
                .collect();
            let mut stss = (sync.len() as u32).to_be_bytes().to_vec();
            for i in sync {
                stss.extend_from_slice(&i.to_be_bytes());
            }
            stbl.extend(full_box(b"stss", 0, 0, &stss));
        }

        let mut stsc = Vec::new();
        if n > 0 {
            stsc.extend_from_slice(&1u32.to_be_bytes());
            for v in [1u32, 1, 1] {
                stsc.extend_from_slice(&v.to_be_bytes());
            }
        } else {
            stsc.extend_from_slice(&0u32.to_be_bytes());
        }
        stbl.extend(full_box(b"stsc", 0, 0, &stsc));

        let mut stsz = 0u32.to_be_bytes().to_vec();
        stsz.extend_from_slice(&n.to_be_bytes());
        for s in &t.samples {
            stsz.extend_from_slice(&(s.data.len() as u32).to_be_bytes());
        }
        stbl.extend(full_box(b"stsz", 0, 0, &stsz));

        let mut stco = n.to_be_bytes().to_vec();
        for &o in offsets {
            stco.extend_from_slice(&(o as u32).to_be_bytes());
        }
        stbl.extend(full_box(b"stco", 0, 0, &stco));

        stbl
    }
}

/// `moof` with one `traf`: `tfhd` (default-base-is-moof, default duration),
/// `tfdt` and a `trun` carrying per-sample sizes and flags.
fn moof(sequence: u32, track: &TrackSpec, fragment: &FragmentSpec, base_time: u64, data_offset: i32) -> Vec<u8> {
    let mfhd = full_box(b"mfhd", 0, 0, &sequence.to_be_bytes());

    let mut tfhd = track.track_id.to_be_bytes().to_vec();
    tfhd.extend_from_slice(&track.sample_duration.to_be_bytes());
    let mut traf = full_box(b"tfhd", 0, 0x02_0008, &tfhd);
    traf.extend(full_box(b"tfdt", 1, 0, &base_time.to_be_bytes()));

    let mut trun = (fragment.samples.len() as u32).to_be_bytes().to_vec();
    trun.extend_from_slice(&data_offset.to_be_bytes());
    for sample in &fragment.samples {
        trun.extend_from_slice(&(sample.data.len() as u32).to_be_bytes());
        let flags: u32 = if sample.sync { 0x0200_0000 } else { 0x0101_0000 };
        trun.extend_from_slice(&flags.to_be_bytes());
    }
    traf.extend(full_box(b"trun", 0, 0x0601, &trun));

    let mut payload = mfhd;
    payload.extend(boxed(b"traf", &traf));
    boxed(b"moof", &payload)
}

fn sample_entry(t: &TrackSpec) -> Vec<u8> {
    let mut p = vec![0; 6];
    p.extend_from_slice(&1u16.to_be_bytes());
    if &t.handler == b"vide" {
        p.extend_from_slice(&[0; 16]);
        p.extend_from_slice(&t.width.to_be_bytes());
        p.extend_from_slice(&t.height.to_be_bytes());
        p.extend_from_slice(&0x0048_0000u32.to_be_bytes());
        p.extend_from_slice(&0x0048_0000u32.to_be_bytes());
        p.extend_from_slice(&[0; 4]);
        p.extend_from_slice(&1u16.to_be_bytes());
        let mut name = [0u8; 32];
        let label = b"synth";
        name[0] = label.len() as u8;
        name[1..1 + label.len()].copy_from_slice(label);
        p.extend_from_slice(&name);
        p.extend_from_slice(&0x0018u16.to_be_bytes());
        p.extend_from_slice(&(-1i16).to_be_bytes());
    } else {
        p.extend_from_slice(&[0; 8]);
        p.extend_from_slice(&2u16.to_be_bytes());
        p.extend_from_slice(&16u16.to_be_bytes());
        p.extend_from_slice(&[0; 4]);
        p.extend_from_slice(&(t.timescale << 16).to_be_bytes());
    }
    if let Some((tag, record)) = &t.config {
        p.extend(boxed(tag, record));
    }
    boxed(&t.format, &p)
}

/// Wrap a payload in a box header.
pub fn boxed(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
    out
}

/// Wrap a payload in a full-box header.
pub fn full_box(box_type: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut p = Vec::with_capacity(payload.len() + 4);
    p.push(version);
    p.extend_from_slice(&flags.to_be_bytes()[1..]);
    p.extend_from_slice(payload);
    boxed(box_type, &p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::{BoxReader, Movie};
    use std::io::Cursor;

    #[test]
    fn test_built_file_round_trips_through_parser() {
        let mut video = TrackSpec::video(1, *b"avc1", 64, 48);
        video.samples = vec![
            SynthSample::new(vec![1; 10], true),
            SynthSample::new(vec![2; 20], false),
        ];
        let data = Mp4Builder::new(600)
            .track(video)
            .layout(vec![
                MdatItem::Raw(vec![0xEE; 5]),
                MdatItem::Sample { track: 0, index: 0 },
            ])
            .build();

        let len = data.len() as u64;
        let mut reader = BoxReader::new(Cursor::new(data), len);
        let tree = reader.read_tree().unwrap();
        assert!(tree.errors.is_empty());
        assert_eq!(tree.covered_bytes(), len);

        let movie = Movie::parse(&mut reader, &tree).unwrap();
        let table = movie.tracks[0].samples().unwrap();
        assert_eq!(table.len(), 2);
        let mdat = movie.media_data[0];
        assert_eq!(table.get(1).unwrap().offset, mdat.offset + 5);
        assert_eq!(table.get(2).unwrap().offset, mdat.offset + 15);
        assert!(!table.get(2).unwrap().is_sync);
        assert_eq!(movie.tracks[0].entry_dimensions(), Some((64, 48)));
    }
}
