//! Pluggable pitch detection over a window of microphone samples.

/// A detected pitch in one analyzed sample window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchEvent {
    pub midi_note: i32,
}

/// Analyzes a window of mono f32 samples and reports a detected note, or
/// `None` when no pitch is present.
///
/// # Window Contract
/// Callers pass the samples belonging to exactly one beat (or the newest
/// capture window when no song position is known). Implementations must not
/// assume a fixed window length.
pub trait AudioSamplesAnalyzer: Send {
    fn process_samples(&mut self, samples: &[f32], sample_rate: u32) -> Option<PitchEvent>;

    fn name(&self) -> &'static str {
        "unknown_analyzer"
    }
}

const DEFAULT_GATE_DB: f32 = -45.0;

/// Lightweight fallback analyzer: an RMS gate followed by a zero-crossing
/// frequency estimate. Good enough for the CLI harness and tests; real
/// deployments inject a proper detector.
#[derive(Debug, Clone)]
pub struct ZeroCrossingAnalyzer {
    gate_db: f32,
}

impl ZeroCrossingAnalyzer {
    pub fn new(gate_db: f32) -> Self {
        Self { gate_db }
    }
}

impl Default for ZeroCrossingAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_DB)
    }
}

impl AudioSamplesAnalyzer for ZeroCrossingAnalyzer {
    fn process_samples(&mut self, samples: &[f32], sample_rate: u32) -> Option<PitchEvent> {
        if samples.len() < 2 || sample_rate == 0 {
            return None;
        }

        let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let rms_db = 20.0 * energy.sqrt().max(1e-6).log10();
        if rms_db < self.gate_db {
            return None;
        }

        let mut crossings = 0usize;
        for pair in samples.windows(2) {
            if (pair[0] >= 0.0) != (pair[1] >= 0.0) {
                crossings += 1;
            }
        }
        if crossings < 2 {
            return None;
        }

        // Two crossings per cycle.
        let duration_secs = samples.len() as f32 / sample_rate as f32;
        let frequency = crossings as f32 / 2.0 / duration_secs;
        let midi_note = (69.0 + 12.0 * (frequency / 440.0).log2()).round() as i32;
        if !(0..=127).contains(&midi_note) {
            return None;
        }
        Some(PitchEvent { midi_note })
    }

    fn name(&self) -> &'static str {
        "zero_crossing_analyzer"
    }
}
