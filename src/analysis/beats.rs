//! Beat catch-up scheduling: turn a continuous position estimate into the
//! bounded range of beats that still need pitch analysis.

use crate::song::SongTiming;
use std::ops::{Range, RangeInclusive};

/// Hard cap on catch-up work. The app may have been suspended in the
/// background for minutes; beats missed beyond this window are dropped, not
/// queued.
pub const MAX_CATCH_UP_BEATS: i32 = 100;

/// Beats to analyze since `last_analyzed_beat`, given the current position
/// estimate and the microphone latency compensation. Empty (`None`) when the
/// current beat has not advanced past the cursor.
///
/// The range ends at the current beat inclusive; the caller advances its
/// cursor to that end even when the cap skipped beats in between.
pub fn beats_to_analyze(
    last_analyzed_beat: i32,
    estimated_position_millis: f64,
    mic_delay_millis: f64,
    timing: &SongTiming,
) -> Option<RangeInclusive<i32>> {
    let adjusted_position_millis = estimated_position_millis - mic_delay_millis;
    let current_beat = timing.current_beat(adjusted_position_millis);
    if current_beat <= last_analyzed_beat {
        return None;
    }
    let first_beat = (last_analyzed_beat + 1).max(current_beat - MAX_CATCH_UP_BEATS);
    Some(first_beat..=current_beat)
}

/// Index range of the samples belonging to `beat` inside a buffer whose last
/// sample corresponds to `position_millis`. `None` when the beat is not fully
/// contained in the buffer (too old, or not recorded yet).
pub fn sample_window_for_beat(
    timing: &SongTiming,
    beat: i32,
    position_millis: f64,
    sample_rate: u32,
    buffer_len: usize,
) -> Option<Range<usize>> {
    if sample_rate == 0 || buffer_len == 0 {
        return None;
    }
    let beat_start_millis = timing.beat_to_millis(beat);
    let beat_end_millis = timing.beat_to_millis(beat + 1);
    // Distance of the beat boundaries from the buffer's end (newest sample).
    let end_behind_millis = position_millis - beat_end_millis;
    let start_behind_millis = position_millis - beat_start_millis;
    if end_behind_millis < 0.0 {
        return None;
    }

    let samples_per_milli = f64::from(sample_rate) / 1000.0;
    let end_behind_samples = (end_behind_millis * samples_per_milli) as usize;
    let start_behind_samples = (start_behind_millis * samples_per_milli) as usize;
    if start_behind_samples > buffer_len {
        return None;
    }
    let start = buffer_len - start_behind_samples;
    let end = buffer_len.saturating_sub(end_behind_samples);
    if start >= end {
        return None;
    }
    Some(start..end)
}
