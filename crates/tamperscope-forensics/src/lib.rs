//! Tamperscope-Forensics: edit detection for MP4/MOV files
//!
//! Cross-references what a container declares (sample tables, edit lists,
//! track geometry, display matrices) with what the coded pictures say about
//! themselves, and reports the residue non-re-encoding editors leave behind:
//! trims, crops, rotations and media data that no sample references any more.
//!
//! # Modules
//!
//! - `scoring` - Signals, weights and noisy-OR confidence
//! - `evidence` - Bitstream evidence gathered per video track
//! - `classify` - Trim, crop and rotate checks
//! - `recover` - Coverage complement and recovery of unreferenced pictures
//! - `anomaly` - Findings

pub mod anomaly;
pub mod classify;
pub mod evidence;
pub mod recover;
pub mod scoring;

pub use anomaly::{Anomaly, AnomalyKind};
pub use classify::{default_editor_signatures, structure_anomalies, CheckToggles, Classifier};
pub use evidence::{
    gather_evidence, SampleFinding, SamplingOptions, TrackEvidence, UnreadableSample,
};
pub use recover::{
    recover_frames, FrameStatus, GapNeighbors, GapReport, PlacementHint, RecoveredFrame,
    RecoveryOptions, RecoveryReport, RejectedCandidate, Relation, SampleRef,
};
pub use scoring::{noisy_or, ScoringWeights, Signal, SignalKind};

use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};
use tamperscope_media::mp4::{BoxReader, Movie};
use tamperscope_media::BoxTree;
use tracing::debug;

/// Everything that tunes an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForensicOptions {
    pub checks: CheckToggles,
    pub weights: ScoringWeights,
    /// Editor names looked for in metadata.
    pub signatures: Vec<String>,
    pub sampling: SamplingOptions,
    pub recovery: RecoveryOptions,
}

impl Default for ForensicOptions {
    fn default() -> Self {
        Self {
            checks: CheckToggles::default(),
            weights: ScoringWeights::default(),
            signatures: default_editor_signatures(),
            sampling: SamplingOptions::default(),
            recovery: RecoveryOptions::default(),
        }
    }
}

/// Result of analyzing one parsed movie.
#[derive(Debug, Clone, Default)]
pub struct Findings {
    /// Bitstream evidence per H.264/HEVC video track.
    pub evidence: Vec<TrackEvidence>,
    /// Structure findings, then per-track checks, then unreferenced regions.
    pub anomalies: Vec<Anomaly>,
    pub recovery: RecoveryReport,
}

/// Run every enabled check and the frame recovery over a parsed movie.
///
/// Unreadable samples and gaps are recorded in the evidence and the
/// recovery report; the remaining checks still run.
pub fn analyze_movie<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    tree: &BoxTree,
    movie: &Movie,
    options: &ForensicOptions,
) -> Findings {
    let evidence: Vec<TrackEvidence> = movie
        .video_tracks()
        .filter_map(|track| gather_evidence(reader, track, &options.sampling))
        .collect();

    let classifier = Classifier::new(
        options.checks.clone(),
        options.weights.clone(),
        options.signatures.clone(),
    );
    let mut anomalies = structure_anomalies(tree, classifier.weights());
    anomalies.extend(classifier.classify(movie, &evidence));

    let recovery = recover_frames(reader, movie, &evidence, &options.recovery);
    anomalies.extend(recovery.anomalies(classifier.weights()));

    debug!(
        tracks = movie.tracks.len(),
        evidence = evidence.len(),
        anomalies = anomalies.len(),
        recovered = recovery.frames.len(),
        "forensic analysis finished"
    );

    Findings {
        evidence,
        anomalies,
        recovery,
    }
}
