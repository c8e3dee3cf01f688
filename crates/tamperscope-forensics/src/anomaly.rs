//! Findings reported per file.

use serde::Serialize;
use tamperscope_media::ByteRange;

use crate::scoring::{Signal, SignalSet};

/// What a finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Trim,
    Crop,
    Rotate,
    UnreferencedRegion,
    Structure,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Trim => "trim",
            Self::Crop => "crop",
            Self::Rotate => "rotate",
            Self::UnreferencedRegion => "unreferenced region",
            Self::Structure => "structure",
        })
    }
}

/// A finding with the signals that support it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// Track the finding concerns, if any.
    pub track_id: Option<u32>,
    /// Byte range the finding concerns, if any.
    pub range: Option<ByteRange>,
    /// Noisy-OR of the signal weights, in `[0, 1]`.
    pub confidence: f64,
    pub signals: Vec<Signal>,
}

impl Anomaly {
    /// Turn a check's signals into a finding. Returns `None` unless at least
    /// one primary signal fired.
    pub fn from_signals(kind: AnomalyKind, signals: SignalSet) -> Option<Self> {
        if !signals.has_primary() {
            return None;
        }
        Some(Self {
            kind,
            track_id: None,
            range: None,
            confidence: signals.confidence(),
            signals: signals.into_signals(),
        })
    }

    pub fn for_track(mut self, track_id: u32) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn at(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }
}
