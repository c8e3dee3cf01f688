//! Bitstream evidence for video tracks.
//!
//! The checks compare what the container declares with what the coded
//! pictures say about themselves. Reading every sample is unnecessary for
//! that: parameter sets come from the decoder configuration record, and the
//! first, last and (a capped number of) sync samples are analyzed.

use std::collections::BTreeSet;
use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};
use tamperscope_media::mp4::{BoxReader, Track, TrackRef};
use tamperscope_probe::{
    BitstreamError, Codec, DecoderConfig, Dimensions, DisplayOrientation, NalFormat, PictureInfo,
    SequenceInfo, SliceType, StreamAnalyzer,
};
use tracing::{debug, warn};

/// How many samples to analyze per track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingOptions {
    /// Sync samples analyzed per track, in decode order.
    pub max_sync_samples: usize,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            max_sync_samples: 64,
        }
    }
}

/// Summary of one analyzed sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleFinding {
    pub index: u32,
    pub offset: u64,
    pub is_sync: bool,
    pub decodable: bool,
    pub dimensions: Option<Dimensions>,
    pub slice_type: Option<SliceType>,
    /// The picture is an IDR/IRAP picture according to its NAL type.
    pub random_access: bool,
}

/// A sample whose bytes could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableSample {
    pub index: u32,
    pub offset: u64,
    pub size: u32,
    pub reason: String,
}

/// Everything learned from a video track's bitstream.
#[derive(Debug, Clone, Serialize)]
pub struct TrackEvidence {
    #[serde(skip)]
    pub track_ref: TrackRef,
    pub track_id: u32,
    pub codec: Codec,
    pub config: Option<DecoderConfig>,
    /// Sequence parameters of the track's (first) SPS.
    pub sequence: Option<SequenceInfo>,
    /// First picture of the first sample in decode order.
    pub first_picture: Option<PictureInfo>,
    /// First display orientation SEI seen.
    pub orientation: Option<DisplayOrientation>,
    pub samples: Vec<SampleFinding>,
    pub errors: Vec<BitstreamError>,
    /// Samples skipped because reading them failed.
    pub unreadable: Vec<UnreadableSample>,
    /// Parameter-set state after analysis, reused for recovery.
    #[serde(skip)]
    pub analyzer: StreamAnalyzer,
}

impl TrackEvidence {
    /// Cropped picture size from the bitstream.
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.sequence.as_ref().map(|s| s.cropped)
    }
}

/// Gather evidence for one track. Returns `None` for tracks whose codec
/// is not H.264 or HEVC.
///
/// A sample that cannot be read is listed in [`TrackEvidence::unreadable`]
/// and the remaining samples are still analyzed.
pub fn gather_evidence<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    track: &Track,
    options: &SamplingOptions,
) -> Option<TrackEvidence> {
    let codec = track.format().and_then(|f| Codec::from_fourcc(&f.0))?;

    let mut errors = Vec::new();
    let record = track
        .sample_entry
        .as_ref()
        .and_then(|entry| entry.codec_config.as_ref());
    let mut config = None;
    let mut analyzer = match record {
        Some(record) => match DecoderConfig::parse(codec, &record.data) {
            Ok(parsed) => {
                let (analyzer, seed_errors) =
                    StreamAnalyzer::from_config(&parsed, record.range.offset);
                errors.extend(seed_errors);
                config = Some(parsed);
                analyzer
            }
            Err(kind) => {
                warn!(track_id = track.track_id, "unusable {}: {}", record.box_type, kind);
                errors.push(kind.at(record.range.offset));
                StreamAnalyzer::new(codec, NalFormat::LengthPrefixed(4))
            }
        },
        // avc3/hev1 may carry all parameter sets in band.
        None => StreamAnalyzer::new(codec, NalFormat::LengthPrefixed(4)),
    };

    let mut evidence_samples = Vec::new();
    let mut unreadable = Vec::new();
    let mut first_picture = None;
    let mut orientation = None;

    if let Some(table) = track.samples() {
        let mut indices: BTreeSet<u32> = table
            .sync_samples()
            .take(options.max_sync_samples)
            .map(|s| s.index)
            .collect();
        if let Some(first) = table.first() {
            indices.insert(first.index);
        }
        if let Some(last) = table.last() {
            indices.insert(last.index);
        }

        for index in indices {
            let Some(sample) = table.get(index) else {
                continue;
            };
            if sample.range().end() > reader.file_size() {
                warn!(
                    track_id = track.track_id,
                    sample = index,
                    range = %sample.range(),
                    "sample lies past the end of the file"
                );
                continue;
            }
            let data = match reader.read_range(sample.range()) {
                Ok(data) => data,
                Err(e) => {
                    warn!(
                        track_id = track.track_id,
                        sample = index,
                        "skipping unreadable sample: {}",
                        e
                    );
                    unreadable.push(UnreadableSample {
                        index,
                        offset: sample.offset,
                        size: sample.size,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let analysis = analyzer.analyze_sample(&data, sample.offset);
            if index == 1 {
                first_picture = analysis.picture.clone();
            }
            if orientation.is_none() {
                orientation = analysis.orientation;
            }
            evidence_samples.push(SampleFinding {
                index,
                offset: sample.offset,
                is_sync: sample.is_sync,
                decodable: analysis.is_decodable(),
                dimensions: analysis.dimensions(),
                slice_type: analysis.picture.as_ref().map(|p| p.slice_type),
                random_access: analysis.picture.as_ref().is_some_and(|p| p.is_sync),
            });
            errors.extend(analysis.errors);
        }
    }

    let sequence = analyzer.primary_sequence();
    debug!(
        track_id = track.track_id,
        %codec,
        samples = evidence_samples.len(),
        errors = errors.len(),
        unreadable = unreadable.len(),
        dimensions = ?sequence.as_ref().map(|s| s.cropped),
        "gathered bitstream evidence"
    );

    Some(TrackEvidence {
        track_ref: track.track_ref,
        track_id: track.track_id,
        codec,
        config,
        sequence,
        first_picture,
        orientation,
        samples: evidence_samples,
        errors,
        unreadable,
        analyzer,
    })
}
