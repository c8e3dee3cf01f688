//! Per-file report: what the container declares, what the bitstream says,
//! and every finding, in one serializable structure.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tamperscope_forensics::{Anomaly, Findings, RecoveryReport, TrackEvidence};
use tamperscope_media::mp4::{
    mac_time_to_utc, CleanAperture, EditList, FileType, HandlerType, MetadataItem, Movie,
    Orientation, PixelAspect, Track,
};
use tamperscope_media::{BoxTree, Mp4Box, ResolutionError, StructuralError};
use tamperscope_probe::{Codec, CropWindow, Dimensions, DisplayOrientation};

use crate::verify::FrameVerification;

/// Everything found about one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub file_size: u64,
    pub file_type: Option<FileType>,
    pub movie: Option<MovieSummary>,
    pub boxes: Vec<Mp4Box>,
    pub structure_errors: Vec<StructuralError>,
    pub tracks: Vec<TrackReport>,
    pub metadata: Vec<MetadataItem>,
    pub anomalies: Vec<Anomaly>,
    pub recovery: RecoveryReport,
    /// Decoder verdicts for recovered frames, by index into
    /// `recovery.frames`.
    pub verification: Vec<FrameVerification>,
    /// Elementary stream files written for recovered frames.
    pub extracted: Vec<PathBuf>,
    /// Errors that stopped part of the analysis.
    pub errors: Vec<String>,
}

/// Movie header fields.
#[derive(Debug, Clone, Serialize)]
pub struct MovieSummary {
    pub timescale: u32,
    pub duration: u64,
    pub duration_seconds: f64,
    pub creation_time: Option<DateTime<Utc>>,
    pub modification_time: Option<DateTime<Utc>>,
    pub orientation: Orientation,
    pub fragments: usize,
}

/// Geometry as written in the container.
#[derive(Debug, Clone, Serialize)]
pub struct DeclaredGeometry {
    /// Track header width and height.
    pub track: Dimensions,
    /// Visual sample entry width and height.
    pub sample_entry: Option<Dimensions>,
    pub clean_aperture: Option<CleanAperture>,
    pub pixel_aspect: Option<PixelAspect>,
}

/// Geometry read from the sequence parameter set.
#[derive(Debug, Clone, Serialize)]
pub struct DerivedGeometry {
    pub coded: Dimensions,
    pub cropped: Dimensions,
    pub crop: CropWindow,
    pub alignment: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub track_id: u32,
    pub handler: HandlerType,
    pub handler_name: String,
    pub format: Option<String>,
    pub codec: Option<Codec>,
    pub enabled: bool,
    pub language: String,
    pub media_timescale: u32,
    /// `mdhd` duration in media timescale.
    pub media_duration: u64,
    /// `tkhd` duration in movie timescale.
    pub track_duration: u64,
    pub creation_time: Option<DateTime<Utc>>,
    pub modification_time: Option<DateTime<Utc>>,
    pub declared: DeclaredGeometry,
    pub derived: Option<DerivedGeometry>,
    pub orientation: Orientation,
    pub codec_orientation: Option<DisplayOrientation>,
    pub edit_list: Option<EditList>,
    pub sample_count: usize,
    pub sync_sample_count: usize,
    /// Samples the edit list leaves out of the presentation.
    pub hidden_samples: Vec<u32>,
    pub resolution_error: Option<ResolutionError>,
    pub bitstream_errors: Vec<String>,
}

impl TrackReport {
    pub fn new(track: &Track, evidence: Option<&TrackEvidence>) -> Self {
        let (width, height) = track.header.dimensions();
        let entry = track.sample_entry.as_ref();
        let table = track.samples();

        Self {
            track_id: track.track_id,
            handler: track.handler,
            handler_name: track.handler_name.clone(),
            format: track.format().map(|f| f.to_display_string()),
            codec: evidence.map(|e| e.codec),
            enabled: track.header.is_enabled(),
            language: track.media.language.clone(),
            media_timescale: track.media.timescale,
            media_duration: track.media.duration,
            track_duration: track.header.duration,
            creation_time: mac_time_to_utc(track.header.creation_time),
            modification_time: mac_time_to_utc(track.header.modification_time),
            declared: DeclaredGeometry {
                track: Dimensions::new(width, height),
                sample_entry: track
                    .entry_dimensions()
                    .map(|(w, h)| Dimensions::new(w, h)),
                clean_aperture: entry.and_then(|e| e.clean_aperture),
                pixel_aspect: entry.and_then(|e| e.pixel_aspect),
            },
            derived: evidence
                .and_then(|e| e.sequence.as_ref())
                .map(|s| DerivedGeometry {
                    coded: s.coded,
                    cropped: s.cropped,
                    crop: s.crop,
                    alignment: s.alignment,
                }),
            orientation: track.header.matrix.orientation(),
            codec_orientation: evidence.and_then(|e| e.orientation),
            edit_list: track.edit_list.clone(),
            sample_count: table.map_or(0, |t| t.len()),
            sync_sample_count: table.map_or(0, |t| t.sync_samples().count()),
            hidden_samples: table.map_or_else(Vec::new, |t| {
                t.hidden_samples().map(|s| s.index).collect()
            }),
            resolution_error: track.sample_table.as_ref().err().cloned(),
            bitstream_errors: evidence.map_or_else(Vec::new, |e| {
                e.errors.iter().map(|err| err.to_string()).collect()
            }),
        }
    }
}

impl FileReport {
    /// An empty report for a file that has not been parsed yet.
    pub fn new(path: impl Into<PathBuf>, file_size: u64) -> Self {
        Self {
            path: path.into(),
            file_size,
            file_type: None,
            movie: None,
            boxes: Vec::new(),
            structure_errors: Vec::new(),
            tracks: Vec::new(),
            metadata: Vec::new(),
            anomalies: Vec::new(),
            recovery: RecoveryReport::default(),
            verification: Vec::new(),
            extracted: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_tree(mut self, tree: &BoxTree) -> Self {
        self.file_size = tree.file_size;
        self.boxes = tree.boxes.clone();
        self.structure_errors = tree.errors.clone();
        self
    }

    pub fn with_findings(mut self, movie: &Movie, findings: Findings) -> Self {
        self.file_type = movie.file_type.clone();
        self.movie = Some(MovieSummary {
            timescale: movie.header.timescale,
            duration: movie.header.duration,
            duration_seconds: movie.header.duration_seconds(),
            creation_time: mac_time_to_utc(movie.header.creation_time),
            modification_time: mac_time_to_utc(movie.header.modification_time),
            orientation: movie.header.matrix.orientation(),
            fragments: movie.fragment_count,
        });
        self.tracks = movie
            .tracks
            .iter()
            .map(|track| {
                let evidence = findings
                    .evidence
                    .iter()
                    .find(|e| e.track_ref == track.track_ref);
                TrackReport::new(track, evidence)
            })
            .collect();
        self.metadata = movie.metadata.clone();
        self.anomalies = findings.anomalies;
        self.recovery = findings.recovery;
        self
    }

    /// Whether any finding was reported.
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty() && self.errors.is_empty()
    }

    /// Highest anomaly confidence, or 0.
    pub fn max_confidence(&self) -> f64 {
        self.anomalies
            .iter()
            .map(|a| a.confidence)
            .fold(0.0, f64::max)
    }
}

/// Human readable summary of a report.
pub fn render_summary(report: &FileReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({} bytes)", report.path.display(), report.file_size);

    if let Some(movie) = &report.movie {
        let _ = writeln!(
            out,
            "  duration {:.3}s, {} track(s){}",
            movie.duration_seconds,
            report.tracks.len(),
            if movie.fragments > 0 {
                format!(", {} fragment(s)", movie.fragments)
            } else {
                String::new()
            }
        );
    }

    for track in &report.tracks {
        let _ = write!(
            out,
            "  track {} {:?} {}",
            track.track_id,
            track.handler,
            track.format.as_deref().unwrap_or("-")
        );
        if track.handler == HandlerType::Video {
            let _ = write!(out, " declared {}", track.declared.track);
            if let Some(derived) = &track.derived {
                let _ = write!(out, " coded {} cropped {}", derived.coded, derived.cropped);
            }
            if track.orientation.rotation != 0 || track.orientation.mirrored {
                let _ = write!(out, " rotated {}°", track.orientation.rotation);
            }
        }
        if !track.hidden_samples.is_empty() {
            let _ = write!(out, " ({} hidden samples)", track.hidden_samples.len());
        }
        let _ = writeln!(out);
    }

    if report.anomalies.is_empty() {
        let _ = writeln!(out, "  no anomalies");
    }
    for anomaly in &report.anomalies {
        let _ = write!(
            out,
            "  [{}] confidence {:.2}",
            anomaly.kind, anomaly.confidence
        );
        if let Some(id) = anomaly.track_id {
            let _ = write!(out, " track {}", id);
        }
        if let Some(range) = anomaly.range {
            let _ = write!(out, " at {}+{}", range.offset, range.length);
        }
        let _ = writeln!(out);
        for signal in &anomaly.signals {
            let _ = writeln!(
                out,
                "      {} {:?}: {}",
                if signal.primary { "*" } else { "-" },
                signal.kind,
                signal.detail
            );
        }
    }

    let recovered = report.recovery.frames.len();
    if recovered > 0 || !report.recovery.rejected.is_empty() {
        let _ = writeln!(
            out,
            "  recovered {} frame(s) ({} picture(s)), {} rejected candidate(s)",
            recovered,
            report.recovery.pictures().count(),
            report.recovery.rejected.len()
        );
    }
    for path in &report.extracted {
        let _ = writeln!(out, "  wrote {}", path.display());
    }
    for error in &report.errors {
        let _ = writeln!(out, "  error: {}", error);
    }
    out
}

/// Indented listing of a box tree, one box per line, then its errors.
pub fn render_tree(tree: &BoxTree) -> String {
    let mut out = String::new();
    for (depth, node) in tree.walk() {
        let _ = writeln!(
            out,
            "{:indent$}{} @{} size {}",
            "",
            node.box_type,
            node.offset,
            node.size,
            indent = depth as usize * 2
        );
    }
    for error in &tree.errors {
        let _ = writeln!(out, "error: {}", error);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_clean() {
        let report = FileReport::new("clip.mp4", 100);
        assert!(report.is_clean());
        assert_eq!(report.max_confidence(), 0.0);

        let text = render_summary(&report);
        assert!(text.starts_with("clip.mp4 (100 bytes)"));
        assert!(text.contains("no anomalies"));
    }

    #[test]
    fn test_errors_make_report_unclean() {
        let mut report = FileReport::new("broken.mov", 3);
        report.errors.push("truncated".to_string());
        assert!(!report.is_clean());
        assert!(render_summary(&report).contains("error: truncated"));
    }

    #[test]
    fn test_report_serializes_named_fields() {
        let report = FileReport::new("clip.mp4", 100);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["file_size"], 100);
        assert!(value["recovery"]["frames"].as_array().unwrap().is_empty());
        assert!(value["movie"].is_null());
    }

    #[test]
    fn test_pixel_aspect_serializes_named_fields() {
        let declared = DeclaredGeometry {
            track: Dimensions::new(1440, 1080),
            sample_entry: Some(Dimensions::new(1440, 1080)),
            clean_aperture: None,
            pixel_aspect: Some(PixelAspect {
                h_spacing: 4,
                v_spacing: 3,
            }),
        };
        let value = serde_json::to_value(&declared).unwrap();
        assert_eq!(
            value["pixel_aspect"],
            serde_json::json!({ "h_spacing": 4, "v_spacing": 3 })
        );

        let square = DeclaredGeometry {
            pixel_aspect: None,
            ..declared
        };
        assert!(serde_json::to_value(&square).unwrap()["pixel_aspect"].is_null());
    }

    #[test]
    fn test_render_tree_indents_children() {
        use tamperscope_media::mp4::BoxReader;
        use tamperscope_media::synth::{Mp4Builder, TrackSpec};

        let data = Mp4Builder::default()
            .track(TrackSpec::video(1, *b"avc1", 320, 240))
            .build();
        let mut reader = BoxReader::new(std::io::Cursor::new(&data), data.len() as u64);
        let tree = reader.read_tree().unwrap();

        let text = render_tree(&tree);
        assert!(text.starts_with("ftyp @0 size"));
        assert!(text.contains("\nmoov @"));
        assert!(text.contains("\n  mvhd @"));
        assert!(text.contains("\n    tkhd @"));
    }
}
