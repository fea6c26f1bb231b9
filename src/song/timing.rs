//! Minimal song timing metadata needed to map a millisecond offset to a beat.

/// BPM and gap of the currently played song.
///
/// Replaced wholesale on every position report from the server; never merged
/// with a previous value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SongTiming {
    pub bpm: f64,
    /// Offset of beat 0 from the start of the audio file, in milliseconds.
    pub gap_millis: f64,
}

impl SongTiming {
    pub fn new(bpm: f64, gap_millis: f64) -> Self {
        Self { bpm, gap_millis }
    }

    /// Fractional beat at the given position in the song.
    pub fn millis_to_beat(&self, position_millis: f64) -> f64 {
        (position_millis - self.gap_millis) / 1000.0 * (self.bpm / 60.0)
    }

    /// Position of the start of `beat`, in milliseconds.
    pub fn beat_to_millis(&self, beat: i32) -> f64 {
        self.gap_millis + f64::from(beat) * 60_000.0 / self.bpm
    }

    /// Integer beat at the given position. Truncates toward zero, so a
    /// position shortly before the gap still maps to beat 0.
    pub fn current_beat(&self, position_millis: f64) -> i32 {
        self.millis_to_beat(position_millis) as i32
    }
}
