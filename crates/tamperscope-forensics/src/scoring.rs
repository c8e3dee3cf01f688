//! Signals and confidence scoring.
//!
//! Every check reduces its observations to a list of [`Signal`]s. A finding
//! needs at least one primary signal; corroborating signals only raise the
//! confidence of a finding that already exists. Confidence is the noisy-OR of
//! the weights of all fired signals, `1 - Π(1 - wᵢ)`.

use serde::{Deserialize, Serialize};

/// Identifier of an observation a check can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    // Trim
    EditListStartOffset,
    EditListEndTruncation,
    DurationShorterThanMovie,
    StartsMidSequence,
    // Crop
    DeclaredDimensionMismatch,
    SampleEntryDimensionMismatch,
    CropBeyondAlignment,
    // Rotate
    NonIdentityTransform,
    DimensionSwapWithoutTransform,
    CodecOrientationConflict,
    TransformWithoutDimensionSwap,
    // Any check
    ModificationTimeChanged,
    EditorSignature,
    // Structure and recovery
    StructuralInconsistency,
    UnreferencedMediaData,
    RecoveredPictures,
}

impl SignalKind {
    /// Whether this signal can establish a finding on its own.
    pub fn is_primary(self) -> bool {
        !matches!(
            self,
            Self::TransformWithoutDimensionSwap
                | Self::ModificationTimeChanged
                | Self::EditorSignature
                | Self::RecoveredPictures
        )
    }
}

/// A fired signal with its weight and a human readable explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub primary: bool,
    pub weight: f64,
    pub detail: String,
}

/// Per-signal weights in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub edit_list_start_offset: f64,
    pub edit_list_end_truncation: f64,
    pub duration_shorter_than_movie: f64,
    pub starts_mid_sequence: f64,
    pub declared_dimension_mismatch: f64,
    pub sample_entry_dimension_mismatch: f64,
    pub crop_beyond_alignment: f64,
    pub non_identity_transform: f64,
    pub dimension_swap_without_transform: f64,
    pub codec_orientation_conflict: f64,
    pub transform_without_dimension_swap: f64,
    pub modification_time_changed: f64,
    pub editor_signature: f64,
    pub structural_inconsistency: f64,
    pub unreferenced_media_data: f64,
    pub recovered_pictures: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            edit_list_start_offset: 0.6,
            edit_list_end_truncation: 0.4,
            duration_shorter_than_movie: 0.3,
            starts_mid_sequence: 0.45,
            declared_dimension_mismatch: 0.5,
            sample_entry_dimension_mismatch: 0.4,
            crop_beyond_alignment: 0.5,
            non_identity_transform: 0.5,
            dimension_swap_without_transform: 0.4,
            codec_orientation_conflict: 0.3,
            transform_without_dimension_swap: 0.15,
            modification_time_changed: 0.2,
            editor_signature: 0.3,
            structural_inconsistency: 0.5,
            unreferenced_media_data: 0.3,
            recovered_pictures: 0.6,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::EditListStartOffset => self.edit_list_start_offset,
            SignalKind::EditListEndTruncation => self.edit_list_end_truncation,
            SignalKind::DurationShorterThanMovie => self.duration_shorter_than_movie,
            SignalKind::StartsMidSequence => self.starts_mid_sequence,
            SignalKind::DeclaredDimensionMismatch => self.declared_dimension_mismatch,
            SignalKind::SampleEntryDimensionMismatch => self.sample_entry_dimension_mismatch,
            SignalKind::CropBeyondAlignment => self.crop_beyond_alignment,
            SignalKind::NonIdentityTransform => self.non_identity_transform,
            SignalKind::DimensionSwapWithoutTransform => self.dimension_swap_without_transform,
            SignalKind::CodecOrientationConflict => self.codec_orientation_conflict,
            SignalKind::TransformWithoutDimensionSwap => self.transform_without_dimension_swap,
            SignalKind::ModificationTimeChanged => self.modification_time_changed,
            SignalKind::EditorSignature => self.editor_signature,
            SignalKind::StructuralInconsistency => self.structural_inconsistency,
            SignalKind::UnreferencedMediaData => self.unreferenced_media_data,
            SignalKind::RecoveredPictures => self.recovered_pictures,
        }
    }

    /// Named weights, for validation and display.
    pub fn entries(&self) -> [(&'static str, f64); 16] {
        [
            ("edit_list_start_offset", self.edit_list_start_offset),
            ("edit_list_end_truncation", self.edit_list_end_truncation),
            ("duration_shorter_than_movie", self.duration_shorter_than_movie),
            ("starts_mid_sequence", self.starts_mid_sequence),
            ("declared_dimension_mismatch", self.declared_dimension_mismatch),
            ("sample_entry_dimension_mismatch", self.sample_entry_dimension_mismatch),
            ("crop_beyond_alignment", self.crop_beyond_alignment),
            ("non_identity_transform", self.non_identity_transform),
            ("dimension_swap_without_transform", self.dimension_swap_without_transform),
            ("codec_orientation_conflict", self.codec_orientation_conflict),
            ("transform_without_dimension_swap", self.transform_without_dimension_swap),
            ("modification_time_changed", self.modification_time_changed),
            ("editor_signature", self.editor_signature),
            ("structural_inconsistency", self.structural_inconsistency),
            ("unreferenced_media_data", self.unreferenced_media_data),
            ("recovered_pictures", self.recovered_pictures),
        ]
    }

    /// Names of weights outside `[0, 1]` (or NaN).
    pub fn out_of_range(&self) -> Vec<&'static str> {
        self.entries()
            .into_iter()
            .filter(|(_, w)| !(0.0..=1.0).contains(w))
            .map(|(name, _)| name)
            .collect()
    }
}

/// `1 - Π(1 - wᵢ)`, with each weight clamped to `[0, 1]`.
pub fn noisy_or(weights: impl IntoIterator<Item = f64>) -> f64 {
    let miss: f64 = weights
        .into_iter()
        .map(|w| 1.0 - w.clamp(0.0, 1.0))
        .product();
    1.0 - miss
}

/// Signals gathered by one check.
#[derive(Debug, Clone, Default)]
pub struct SignalSet {
    signals: Vec<Signal>,
}

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&mut self, kind: SignalKind, weights: &ScoringWeights, detail: impl Into<String>) {
        self.signals.push(Signal {
            kind,
            primary: kind.is_primary(),
            weight: weights.weight(kind),
            detail: detail.into(),
        });
    }

    pub fn extend(&mut self, other: &[Signal]) {
        self.signals.extend_from_slice(other);
    }

    pub fn has_primary(&self) -> bool {
        self.signals.iter().any(|s| s.primary)
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn confidence(&self) -> f64 {
        noisy_or(self.signals.iter().map(|s| s.weight))
    }

    pub fn into_signals(self) -> Vec<Signal> {
        self.signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_or() {
        assert_eq!(noisy_or([]), 0.0);
        assert!((noisy_or([0.5]) - 0.5).abs() < 1e-9);
        assert!((noisy_or([0.5, 0.5]) - 0.75).abs() < 1e-9);
        assert_eq!(noisy_or([1.0, 0.2]), 1.0);
        // Out-of-range weights are clamped.
        assert_eq!(noisy_or([-3.0]), 0.0);
    }

    #[test]
    fn test_more_signals_never_lower_confidence() {
        let weights = ScoringWeights::default();
        let mut set = SignalSet::new();
        set.fire(SignalKind::NonIdentityTransform, &weights, "90 degrees");
        let one = set.confidence();
        set.fire(SignalKind::ModificationTimeChanged, &weights, "modified");
        assert!(set.confidence() > one);
        assert!(set.has_primary());
    }

    #[test]
    fn test_corroborating_alone_is_not_primary() {
        let weights = ScoringWeights::default();
        let mut set = SignalSet::new();
        set.fire(SignalKind::EditorSignature, &weights, "Photos");
        set.fire(SignalKind::ModificationTimeChanged, &weights, "modified");
        assert!(!set.has_primary());
        assert!(!set.is_empty());
    }

    #[test]
    fn test_weight_validation() {
        let mut weights = ScoringWeights::default();
        assert!(weights.out_of_range().is_empty());
        weights.editor_signature = 1.5;
        weights.crop_beyond_alignment = f64::NAN;
        assert_eq!(
            weights.out_of_range(),
            vec!["crop_beyond_alignment", "editor_signature"]
        );
    }

    #[test]
    fn test_weights_deserialize_partial() {
        let weights: ScoringWeights =
            serde_json::from_str(r#"{"non_identity_transform": 0.9}"#).unwrap();
        assert_eq!(weights.non_identity_transform, 0.9);
        assert_eq!(weights.edit_list_start_offset, 0.6);
    }
}
