//! Pitch analysis seams and beat catch-up scheduling.
//!
//! The actual pitch detection DSP is pluggable behind [`AudioSamplesAnalyzer`];
//! this module owns the decision of *which* sample windows to analyze.

mod analyzer;
mod beats;

pub use analyzer::{AudioSamplesAnalyzer, PitchEvent, ZeroCrossingAnalyzer};
pub use beats::{beats_to_analyze, sample_window_for_beat, MAX_CATCH_UP_BEATS};
