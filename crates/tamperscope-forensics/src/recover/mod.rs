//! Recovery of coded pictures from unreferenced media data.
//!
//! Editors that trim without re-encoding often rewrite only the sample
//! tables, so the removed pictures stay in `mdat`. The coverage complement
//! of all sample ranges gives the gaps; each gap is scanned for NAL unit
//! chains, grouped into access units and analyzed with the parameter sets
//! of the video track whose framing fits best. Every byte of a gap ends up
//! either in a [`RecoveredFrame`] or in a [`RejectedCandidate`].

mod coverage;
mod placement;
mod scan;

pub use coverage::{uncovered_gaps, Gap, GapNeighbors, SampleRef};
pub use placement::{PlacementHint, Relation};
pub use scan::{plausible_header, scan_annex_b, scan_length_prefixed, Chain, Scan};

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};
use tamperscope_media::mp4::{BoxReader, Movie, TrackRef};
use tamperscope_media::ByteRange;
use tamperscope_probe::{
    BitstreamErrorKind, Codec, Dimensions, NalFormat, PictureInfo, SampleAnalysis,
};
use tracing::{debug, info, warn};

use crate::anomaly::{Anomaly, AnomalyKind};
use crate::evidence::TrackEvidence;
use crate::scoring::{ScoringWeights, SignalKind, SignalSet};
use placement::Placer;

/// Limits for gap scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryOptions {
    pub enabled: bool,
    /// Bytes of one gap that are scanned; the rest is rejected.
    pub max_gap_bytes: u64,
    /// Look up neighbouring declared samples for placement hints.
    pub placement: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_gap_bytes: 64 * 1024 * 1024,
            placement: true,
        }
    }
}

/// How much of a recovered picture could be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    /// Complete picture whose headers all parse against the track's
    /// parameter sets.
    Decodable,
    /// The last unit runs past the end of the gap.
    EdgeTruncated,
    /// Some units parse but the picture is incomplete or ambiguous.
    Partial,
    /// The units do not parse.
    Undecodable,
}

impl FrameStatus {
    pub fn confidence(self) -> f64 {
        match self {
            Self::Decodable => 0.95,
            Self::EdgeTruncated => 0.7,
            Self::Partial => 0.4,
            Self::Undecodable => 0.2,
        }
    }

    /// Whether the frame holds a usable picture.
    pub fn is_picture(self) -> bool {
        matches!(self, Self::Decodable | Self::EdgeTruncated)
    }
}

impl std::fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Decodable => "decodable",
            Self::EdgeTruncated => "edge-truncated",
            Self::Partial => "partial",
            Self::Undecodable => "undecodable",
        })
    }
}

/// An access unit found outside every sample table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveredFrame {
    /// Bytes of the access unit, length prefixes or start codes included.
    pub range: ByteRange,
    /// NAL units, header included, prefix excluded.
    pub units: Vec<ByteRange>,
    /// Track whose parameter sets were used.
    pub track_id: u32,
    #[serde(skip)]
    pub track: TrackRef,
    pub codec: Codec,
    pub format: NalFormat,
    pub status: FrameStatus,
    pub confidence: f64,
    pub picture: Option<PictureInfo>,
    pub dimensions: Option<Dimensions>,
    /// Why the frame is not fully decodable.
    pub reason: Option<String>,
    /// Gap the frame was found in.
    pub gap: ByteRange,
    pub neighbors: GapNeighbors,
    pub placement: Option<PlacementHint>,
}

/// A byte run that could not be read as coded video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedCandidate {
    pub range: ByteRange,
    pub gap: ByteRange,
    pub reason: String,
}

/// Summary of one gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapReport {
    pub range: ByteRange,
    pub neighbors: GapNeighbors,
    /// Framing that matched the most bytes, if any did.
    pub format: Option<NalFormat>,
    pub track_id: Option<u32>,
    pub frames: usize,
    pub pictures: usize,
    pub rejected: usize,
}

/// Everything found in unreferenced media data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryReport {
    pub gaps: Vec<GapReport>,
    pub frames: Vec<RecoveredFrame>,
    pub rejected: Vec<RejectedCandidate>,
}

impl RecoveryReport {
    pub fn unreferenced_bytes(&self) -> u64 {
        self.gaps.iter().map(|g| g.range.length).sum()
    }

    /// Frames holding a usable picture.
    pub fn pictures(&self) -> impl Iterator<Item = &RecoveredFrame> {
        self.frames.iter().filter(|f| f.status.is_picture())
    }

    /// One `UnreferencedRegion` finding per gap.
    pub fn anomalies(&self, weights: &ScoringWeights) -> Vec<Anomaly> {
        self.gaps
            .iter()
            .filter_map(|gap| {
                let mut set = SignalSet::new();
                set.fire(
                    SignalKind::UnreferencedMediaData,
                    weights,
                    format!("{} bytes of media data no sample references", gap.range.length),
                );
                if gap.pictures > 0 {
                    set.fire(
                        SignalKind::RecoveredPictures,
                        weights,
                        format!("{} coded pictures recovered", gap.pictures),
                    );
                }
                let anomaly = Anomaly::from_signals(AnomalyKind::UnreferencedRegion, set)?
                    .at(gap.range);
                Some(match gap.track_id {
                    Some(id) if gap.frames > 0 => anomaly.for_track(id),
                    _ => anomaly,
                })
            })
            .collect()
    }
}

/// Codec and NAL length size to scan a gap with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Framing {
    codec: Codec,
    length_size: u8,
}

/// Scan every gap of the movie.
pub fn recover_frames<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    movie: &Movie,
    evidence: &[TrackEvidence],
    options: &RecoveryOptions,
) -> RecoveryReport {
    let mut report = RecoveryReport::default();
    if !options.enabled {
        return report;
    }

    // First track per framing, in track order.
    let mut framings: BTreeMap<Framing, &TrackEvidence> = BTreeMap::new();
    for track in evidence {
        let length_size = match track.analyzer.format() {
            NalFormat::LengthPrefixed(size) => size,
            NalFormat::AnnexB => 4,
        };
        framings
            .entry(Framing {
                codec: track.codec,
                length_size,
            })
            .or_insert(track);
    }

    let mut placers = BTreeMap::new();
    for gap in uncovered_gaps(movie) {
        recover_gap(reader, movie, &framings, options, &gap, &mut placers, &mut report);
    }

    if !report.gaps.is_empty() {
        info!(
            gaps = report.gaps.len(),
            bytes = report.unreferenced_bytes(),
            frames = report.frames.len(),
            pictures = report.pictures().count(),
            "unreferenced media data"
        );
    }
    report
}

fn recover_gap<'m, R: Read + Seek>(
    reader: &mut BoxReader<R>,
    movie: &'m Movie,
    framings: &BTreeMap<Framing, &TrackEvidence>,
    options: &RecoveryOptions,
    gap: &Gap,
    placers: &mut BTreeMap<TrackRef, Placer<'m>>,
    report: &mut RecoveryReport,
) {
    let scanned = ByteRange::new(gap.range.offset, gap.range.length.min(options.max_gap_bytes));
    let mut gap_report = GapReport {
        range: gap.range,
        neighbors: gap.neighbors,
        format: None,
        track_id: None,
        frames: 0,
        pictures: 0,
        rejected: 0,
    };
    let rejected_before = report.rejected.len();
    let frames_before = report.frames.len();

    let data = if scanned.is_empty() {
        Vec::new()
    } else {
        match reader.read_range_limited(scanned, options.max_gap_bytes) {
            Ok(data) => data,
            Err(e) => {
                warn!(gap = %gap.range, "cannot read gap: {}", e);
                report.rejected.push(RejectedCandidate {
                    range: gap.range,
                    gap: gap.range,
                    reason: format!("unreadable: {}", e),
                });
                gap_report.rejected = 1;
                report.gaps.push(gap_report);
                return;
            }
        }
    };

    let best = best_scan(&data, framings);
    match best {
        Some((scan, owner)) => {
            gap_report.format = Some(scan.format);
            gap_report.track_id = Some(owner.track_id);
            for (run, reason) in &scan.rejected {
                report.rejected.push(RejectedCandidate {
                    range: ByteRange::from_bounds(
                        scanned.offset + run.start as u64,
                        scanned.offset + run.end as u64,
                    ),
                    gap: gap.range,
                    reason: (*reason).to_string(),
                });
            }
            let frames = analyze_chains(&data, &scan, owner, gap, scanned.offset);
            report.frames.extend(frames);
        }
        None if !data.is_empty() => {
            let reason = if framings.is_empty() {
                "no video track to interpret the data"
            } else if data.iter().all(|&b| b == 0) {
                "zero fill"
            } else {
                "no plausible NAL unit"
            };
            report.rejected.push(RejectedCandidate {
                range: scanned,
                gap: gap.range,
                reason: reason.to_string(),
            });
        }
        None => {}
    }

    if scanned.length < gap.range.length {
        report.rejected.push(RejectedCandidate {
            range: ByteRange::from_bounds(scanned.end(), gap.range.end()),
            gap: gap.range,
            reason: "exceeds scan limit".to_string(),
        });
    }

    if options.placement {
        for frame in &mut report.frames[frames_before..] {
            let Some(dimensions) = frame.dimensions.filter(|_| frame.status.is_picture()) else {
                continue;
            };
            let placer = match placers.entry(frame.track) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let owner = framings.values().find(|e| e.track_ref == frame.track);
                    let (Some(owner), Some(track)) = (owner, movie.track(frame.track)) else {
                        continue;
                    };
                    entry.insert(Placer::new(track, &owner.analyzer))
                }
            };
            frame.placement = placer.place(reader, frame.range, dimensions);
        }
    }

    let frames = &report.frames[frames_before..];
    gap_report.frames = frames.len();
    gap_report.pictures = frames.iter().filter(|f| f.status.is_picture()).count();
    gap_report.rejected = report.rejected.len() - rejected_before;
    debug!(
        gap = %gap.range,
        format = ?gap_report.format,
        frames = gap_report.frames,
        pictures = gap_report.pictures,
        rejected = gap_report.rejected,
        "scanned gap"
    );
    report.gaps.push(gap_report);
}

/// The framing that explains the most bytes; Annex-B only when no
/// length-prefixed framing matches anything.
fn best_scan<'e>(
    data: &[u8],
    framings: &BTreeMap<Framing, &'e TrackEvidence>,
) -> Option<(Scan, &'e TrackEvidence)> {
    if data.is_empty() {
        return None;
    }
    let mut best: Option<(Scan, &TrackEvidence)> = None;
    for (framing, owner) in framings {
        let scan = scan_length_prefixed(data, framing.codec, framing.length_size);
        if scan.matched > best.as_ref().map_or(0, |(b, _)| b.matched) {
            best = Some((scan, *owner));
        }
    }
    if best.is_none() {
        for (framing, owner) in framings {
            let scan = scan_annex_b(data, framing.codec);
            if scan.matched > best.as_ref().map_or(0, |(b, _)| b.matched) {
                best = Some((scan, *owner));
            }
        }
    }
    best
}

fn analyze_chains(
    data: &[u8],
    scan: &Scan,
    owner: &TrackEvidence,
    gap: &Gap,
    base: u64,
) -> Vec<RecoveredFrame> {
    let mut analyzer = owner.analyzer.with_format(scan.format);
    let prefix = match scan.format {
        NalFormat::LengthPrefixed(size) => size as usize,
        NalFormat::AnnexB => 3,
    };
    let mut frames = Vec::new();

    for chain in &scan.chains {
        for au in scan::access_units(data, scan.codec, chain) {
            let (Some(first), Some(last)) = (au.units.first(), au.units.last()) else {
                continue;
            };
            let mut analysis = analyzer.analyze_units(data, &au.units, base);
            analysis.truncated = au.truncated;
            let (status, reason) = classify_frame(&analysis);
            frames.push(RecoveredFrame {
                range: ByteRange::from_bounds(
                    base + first.start.saturating_sub(prefix) as u64,
                    base + last.end as u64,
                ),
                units: au
                    .units
                    .iter()
                    .map(|u| ByteRange::from_bounds(base + u.start as u64, base + u.end as u64))
                    .collect(),
                track_id: owner.track_id,
                track: owner.track_ref,
                codec: scan.codec,
                format: scan.format,
                status,
                confidence: status.confidence(),
                dimensions: analysis.dimensions(),
                picture: analysis.picture,
                reason,
                gap: gap.range,
                neighbors: gap.neighbors,
                placement: None,
            });
        }
    }
    frames
}

/// Status of an analyzed access unit, with the reason it is not fully
/// decodable.
fn classify_frame(analysis: &SampleAnalysis) -> (FrameStatus, Option<String>) {
    let Some(picture) = &analysis.picture else {
        let reason = analysis
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no coded picture".to_string());
        let status = if analysis.errors.is_empty() {
            FrameStatus::Partial
        } else {
            FrameStatus::Undecodable
        };
        return (status, Some(reason));
    };

    if let Some(first) = analysis.errors.first() {
        let only_truncation = analysis
            .errors
            .iter()
            .all(|e| matches!(e.kind, BitstreamErrorKind::Truncated { .. }));
        if analysis.truncated && only_truncation {
            return (FrameStatus::EdgeTruncated, Some("unit truncated at gap boundary".into()));
        }
        return (FrameStatus::Partial, Some(first.to_string()));
    }
    if analysis.truncated {
        return (FrameStatus::EdgeTruncated, Some("unit truncated at gap boundary".into()));
    }
    if !picture.first_slice {
        return (
            FrameStatus::Partial,
            Some("first slice of the picture is missing".into()),
        );
    }
    (FrameStatus::Decodable, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tamperscope_probe::BitstreamError;

    #[test]
    fn test_status_confidence_is_ordered() {
        let statuses = [
            FrameStatus::Decodable,
            FrameStatus::EdgeTruncated,
            FrameStatus::Partial,
            FrameStatus::Undecodable,
        ];
        for pair in statuses.windows(2) {
            assert!(pair[0].confidence() > pair[1].confidence());
        }
        assert!(FrameStatus::EdgeTruncated.is_picture());
        assert!(!FrameStatus::Partial.is_picture());
    }

    #[test]
    fn test_classify_without_picture() {
        let analysis = SampleAnalysis::default();
        assert_eq!(
            classify_frame(&analysis),
            (FrameStatus::Partial, Some("no coded picture".to_string()))
        );

        let analysis = SampleAnalysis {
            errors: vec![BitstreamError::new(40, BitstreamErrorKind::ForbiddenBit)],
            ..Default::default()
        };
        let (status, reason) = classify_frame(&analysis);
        assert_eq!(status, FrameStatus::Undecodable);
        assert!(reason.is_some());
    }
}
