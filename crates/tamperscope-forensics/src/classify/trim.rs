//! Trim: the presented range is shorter than the stored media.

use tamperscope_media::mp4::{rescale, Track};

use super::TrackContext;
use crate::scoring::{SignalKind, SignalSet};

pub(super) fn check(ctx: &TrackContext<'_>) -> SignalSet {
    let mut set = SignalSet::new();
    let track = ctx.track;
    let movie_timescale = ctx.movie.header.timescale;
    let media_timescale = track.media.timescale;

    if let Some(table) = track.samples().filter(|t| !t.is_empty()) {
        let frame = table.first().map_or(0, |s| s.duration as i64);
        let lead_in = table.composition_lead_in();

        if let Some(edits) = &track.edit_list {
            if let Some(start) = edits.first_media_time() {
                let skipped = start - lead_in;
                if skipped > frame {
                    set.fire(
                        SignalKind::EditListStartOffset,
                        ctx.weights,
                        format!(
                            "presentation starts {} ticks into the media (lead-in {}, frame {})",
                            start, lead_in, frame
                        ),
                    );
                }
            }
            if let Some(end) = edits.presented_media_end(movie_timescale, media_timescale) {
                let media_end = table.media_duration() as i64 + lead_in;
                if media_end - end > frame {
                    set.fire(
                        SignalKind::EditListEndTruncation,
                        ctx.weights,
                        format!(
                            "presentation ends at {} of {} media ticks",
                            end, media_end
                        ),
                    );
                }
            }
        }

        if let Some(extent) = presented_extent(track, movie_timescale) {
            let tolerance = rescale(frame as u64, media_timescale, movie_timescale) + 1;
            let declared = track.header.duration;
            if declared > extent + tolerance {
                set.fire(
                    SignalKind::DurationShorterThanMovie,
                    ctx.weights,
                    format!(
                        "samples cover {} of {} declared track ticks",
                        extent, declared
                    ),
                );
            } else {
                let referenced = ctx
                    .movie
                    .tracks
                    .iter()
                    .filter_map(|t| presented_extent(t, movie_timescale))
                    .max()
                    .unwrap_or(0);
                let movie_duration = ctx.movie.header.duration;
                if movie_duration > referenced + tolerance {
                    set.fire(
                        SignalKind::DurationShorterThanMovie,
                        ctx.weights,
                        format!(
                            "longest track covers {} of {} movie ticks",
                            referenced, movie_duration
                        ),
                    );
                }
            }
        }
    }

    if let Some(picture) = ctx.evidence.and_then(|e| e.first_picture.as_ref()) {
        if picture.starts_mid_sequence() {
            set.fire(
                SignalKind::StartsMidSequence,
                ctx.weights,
                format!(
                    "first picture has frame_num {:?}, pic_order_cnt_lsb {:?}",
                    picture.frame_num, picture.pic_order_cnt_lsb
                ),
            );
        }
    }

    set
}

/// Movie-time span a track plays: leading empty edits plus its presented
/// samples.
fn presented_extent(track: &Track, movie_timescale: u32) -> Option<u64> {
    let table = track.samples().filter(|t| !t.is_empty())?;
    let presented: u64 = table
        .iter()
        .filter(|s| s.presented)
        .map(|s| s.duration as u64)
        .sum();
    let delay = track
        .edit_list
        .as_ref()
        .map_or(0, |edits| edits.leading_empty_duration());
    Some(delay + rescale(presented, track.media.timescale, movie_timescale))
}
