//! Crop: the declared picture size disagrees with the coded one.

use tamperscope_media::mp4::PixelAspect;
use tamperscope_probe::Dimensions;

use super::{combined_rotation, declared_dimensions, TrackContext};
use crate::scoring::{SignalKind, SignalSet};

pub(super) fn check(ctx: &TrackContext<'_>) -> SignalSet {
    let mut set = SignalSet::new();
    let Some(sequence) = ctx.evidence.and_then(|e| e.sequence.as_ref()) else {
        return set;
    };
    let entry = ctx.track.sample_entry.as_ref();

    if let Some(declared) = declared_dimensions(ctx) {
        let (rotation, _) = combined_rotation(ctx);
        let normalized = if rotation == 90 || rotation == 270 {
            declared.swapped()
        } else {
            declared
        };
        let mut accepted = vec![display_size(sequence.cropped, entry.and_then(|e| e.pixel_aspect))];
        if let Some(clap) = entry.and_then(|e| e.clean_aperture.as_ref()) {
            accepted.push(Dimensions::new(clap.width.round() as u32, clap.height.round() as u32));
        }
        let matches = accepted
            .iter()
            .any(|a| close(normalized, *a) || close(normalized, a.swapped()));
        if !matches {
            set.fire(
                SignalKind::DeclaredDimensionMismatch,
                ctx.weights,
                format!(
                    "track header declares {}, bitstream decodes to {}",
                    normalized, sequence.cropped
                ),
            );
        }
    }

    if let Some((width, height)) = ctx.track.entry_dimensions() {
        let entry_size = Dimensions::new(width, height);
        if width > 0 && height > 0 && entry_size != sequence.cropped && entry_size != sequence.coded {
            set.fire(
                SignalKind::SampleEntryDimensionMismatch,
                ctx.weights,
                format!(
                    "sample entry declares {}, bitstream decodes to {} (coded {})",
                    entry_size, sequence.cropped, sequence.coded
                ),
            );
        }
    }

    if sequence.crops_beyond_alignment() {
        let c = sequence.crop;
        set.fire(
            SignalKind::CropBeyondAlignment,
            ctx.weights,
            format!(
                "crop window l{} r{} t{} b{} on {} coded",
                c.left, c.right, c.top, c.bottom, sequence.coded
            ),
        );
    }

    set
}

/// Cropped size stretched by the pixel aspect ratio.
fn display_size(cropped: Dimensions, pixel_aspect: Option<PixelAspect>) -> Dimensions {
    match pixel_aspect.map(|p| (p.h_spacing, p.v_spacing)) {
        Some((h, v)) if h > 0 && v > 0 && h != v => {
            let width = (cropped.width as u64 * h as u64 + v as u64 / 2) / v as u64;
            Dimensions::new(width as u32, cropped.height)
        }
        _ => cropped,
    }
}

/// Equal within one pixel on each axis.
fn close(a: Dimensions, b: Dimensions) -> bool {
    a.width.abs_diff(b.width) <= 1 && a.height.abs_diff(b.height) <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_size_applies_pixel_aspect() {
        let cropped = Dimensions::new(1440, 1080);
        let pasp = |h_spacing, v_spacing| Some(PixelAspect { h_spacing, v_spacing });
        assert_eq!(display_size(cropped, pasp(4, 3)), Dimensions::new(1920, 1080));
        assert_eq!(display_size(cropped, pasp(1, 1)), cropped);
        assert_eq!(display_size(cropped, pasp(0, 1)), cropped);
        assert_eq!(display_size(cropped, None), cropped);
    }

    #[test]
    fn test_close_tolerates_one_pixel() {
        let a = Dimensions::new(1920, 1080);
        assert!(close(a, Dimensions::new(1919, 1081)));
        assert!(!close(a, Dimensions::new(1918, 1080)));
    }
}
