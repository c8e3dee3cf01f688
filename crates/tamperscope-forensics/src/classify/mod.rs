//! Cross-reference checks: trim, crop and rotate.
//!
//! Each check looks at one track and produces at most one [`Anomaly`]. Checks
//! run independently and are never merged into a single verdict; an edited
//! file may show any subset of them.

mod crop;
mod rotate;
mod trim;

use serde::{Deserialize, Serialize};
use tamperscope_media::mp4::{MetadataItem, Movie, Track};
use tamperscope_media::{BoxTree, ByteRange};
use tamperscope_probe::Dimensions;
use tracing::debug;

use crate::anomaly::{Anomaly, AnomalyKind};
use crate::evidence::TrackEvidence;
use crate::scoring::{ScoringWeights, Signal, SignalKind, SignalSet};

/// Which checks run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckToggles {
    pub trim: bool,
    pub crop: bool,
    pub rotate: bool,
}

impl Default for CheckToggles {
    fn default() -> Self {
        Self {
            trim: true,
            crop: true,
            rotate: true,
        }
    }
}

/// Editor names looked for in metadata, matched case-insensitively as
/// substrings.
pub fn default_editor_signatures() -> Vec<String> {
    ["com.apple.photos", "Photos", "iMovie"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// What a check sees of one track.
pub struct TrackContext<'a> {
    pub movie: &'a Movie,
    pub track: &'a Track,
    pub evidence: Option<&'a TrackEvidence>,
    pub weights: &'a ScoringWeights,
}

/// Runs the enabled checks over every video track.
#[derive(Debug, Clone)]
pub struct Classifier {
    toggles: CheckToggles,
    weights: ScoringWeights,
    signatures: Vec<String>,
}

impl Classifier {
    pub fn new(toggles: CheckToggles, weights: ScoringWeights, signatures: Vec<String>) -> Self {
        Self {
            toggles,
            weights,
            signatures,
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Trim, crop and rotate findings for every video track, in track order.
    pub fn classify(&self, movie: &Movie, evidence: &[TrackEvidence]) -> Vec<Anomaly> {
        let corroboration = self.corroborating_signals(movie);
        let mut anomalies = Vec::new();

        for track in movie.video_tracks() {
            let ctx = TrackContext {
                movie,
                track,
                evidence: evidence.iter().find(|e| e.track_ref == track.track_ref),
                weights: &self.weights,
            };
            let checks: [(bool, AnomalyKind, fn(&TrackContext<'_>) -> SignalSet); 3] = [
                (self.toggles.trim, AnomalyKind::Trim, trim::check),
                (self.toggles.crop, AnomalyKind::Crop, crop::check),
                (self.toggles.rotate, AnomalyKind::Rotate, rotate::check),
            ];
            for (enabled, kind, check) in checks {
                if !enabled {
                    continue;
                }
                let mut signals = check(&ctx);
                if !signals.has_primary() {
                    continue;
                }
                signals.extend(&corroboration);
                signals.extend(&self.track_corroboration(track));
                if let Some(anomaly) = Anomaly::from_signals(kind, signals) {
                    debug!(
                        track_id = track.track_id,
                        %kind,
                        confidence = anomaly.confidence,
                        "check fired"
                    );
                    anomalies.push(anomaly.for_track(track.track_id));
                }
            }
        }
        anomalies
    }

    /// Signals that concern the whole file.
    fn corroborating_signals(&self, movie: &Movie) -> Vec<Signal> {
        let mut set = SignalSet::new();
        let header = &movie.header;
        if header.creation_time != 0
            && header.modification_time != 0
            && header.modification_time != header.creation_time
        {
            set.fire(
                SignalKind::ModificationTimeChanged,
                &self.weights,
                format!(
                    "movie modified {} s after creation",
                    header.modification_time as i64 - header.creation_time as i64
                ),
            );
        }
        if let Some(item) = self.matching_signature(&movie.metadata) {
            set.fire(
                SignalKind::EditorSignature,
                &self.weights,
                format!("metadata {} = {:?}", item.key, item.value),
            );
        }
        set.into_signals()
    }

    fn track_corroboration(&self, track: &Track) -> Vec<Signal> {
        let mut set = SignalSet::new();
        let header = &track.header;
        if header.creation_time != 0
            && header.modification_time != 0
            && header.modification_time != header.creation_time
        {
            set.fire(
                SignalKind::ModificationTimeChanged,
                &self.weights,
                format!("track {} modified after creation", track.track_id),
            );
        }
        set.into_signals()
    }

    fn matching_signature<'m>(&self, items: &'m [MetadataItem]) -> Option<&'m MetadataItem> {
        let needles: Vec<String> = self
            .signatures
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect();
        items.iter().find(|item| {
            let value = item.value.to_lowercase();
            needles.iter().any(|n| value.contains(n))
        })
    }
}

/// One `Structure` finding per recorded box error, located at the bad header.
pub fn structure_anomalies(tree: &BoxTree, weights: &ScoringWeights) -> Vec<Anomaly> {
    tree.errors
        .iter()
        .filter_map(|error| {
            let mut set = SignalSet::new();
            set.fire(SignalKind::StructuralInconsistency, weights, error.to_string());
            Anomaly::from_signals(AnomalyKind::Structure, set)
                .map(|a| a.at(ByteRange::new(error.offset, 0)))
        })
        .collect()
}

/// Clockwise rotation of the track matrix composed with the movie matrix.
fn combined_rotation(ctx: &TrackContext<'_>) -> (u16, bool) {
    let track = ctx.track.header.matrix.orientation();
    let movie = ctx.movie.header.matrix.orientation();
    (
        (track.rotation + movie.rotation) % 360,
        track.mirrored != movie.mirrored,
    )
}

/// Declared `tkhd` size.
fn declared_dimensions(ctx: &TrackContext<'_>) -> Option<Dimensions> {
    let (w, h) = ctx.track.header.dimensions();
    (w > 0 && h > 0).then(|| Dimensions::new(w, h))
}
