//! Rotate: the display transform disagrees with how the pictures were coded.

use tamperscope_probe::DisplayOrientation;

use super::{combined_rotation, declared_dimensions, TrackContext};
use crate::scoring::{SignalKind, SignalSet};

pub(super) fn check(ctx: &TrackContext<'_>) -> SignalSet {
    let mut set = SignalSet::new();
    let (rotation, mirrored) = combined_rotation(ctx);
    let track_matrix = &ctx.track.header.matrix;
    let movie_matrix = &ctx.movie.header.matrix;

    if !track_matrix.is_unrotated() || !movie_matrix.is_unrotated() {
        set.fire(
            SignalKind::NonIdentityTransform,
            ctx.weights,
            format!(
                "display matrix rotates {} degrees{}",
                rotation,
                if mirrored { " and mirrors" } else { "" }
            ),
        );
    }

    let coded = ctx.evidence.and_then(|e| e.dimensions());
    let swaps = rotation == 90 || rotation == 270;
    if let (Some(declared), Some(coded)) = (declared_dimensions(ctx), coded) {
        let square = coded.width == coded.height;
        if !square && !swaps && declared == coded.swapped() {
            set.fire(
                SignalKind::DimensionSwapWithoutTransform,
                ctx.weights,
                format!(
                    "track header declares {} for {} pictures without a rotation",
                    declared, coded
                ),
            );
        }
        if !square && swaps && declared == coded {
            set.fire(
                SignalKind::TransformWithoutDimensionSwap,
                ctx.weights,
                format!(
                    "{} degree rotation keeps the coded {} size",
                    rotation, coded
                ),
            );
        }
    }

    if let Some(sei) = ctx.evidence.and_then(|e| e.orientation).filter(|o| !o.cancel) {
        let (sei_rotation, sei_mirrored) = sei_transform(&sei);
        if sei_rotation != rotation || sei_mirrored != mirrored {
            set.fire(
                SignalKind::CodecOrientationConflict,
                ctx.weights,
                format!(
                    "display orientation SEI asks for {} degrees{}, matrix gives {}",
                    sei_rotation,
                    if sei_mirrored { " mirrored" } else { "" },
                    rotation
                ),
            );
        }
    }

    set
}

/// Clockwise rotation and mirroring requested by an orientation SEI. A
/// horizontal plus vertical flip is a half turn.
fn sei_transform(sei: &DisplayOrientation) -> (u16, bool) {
    let both = sei.horizontal_flip && sei.vertical_flip;
    let rotation = (sei.clockwise_degrees() + if both { 180 } else { 0 }) % 360;
    (rotation, sei.horizontal_flip != sei.vertical_flip)
}
