//! Client orchestration: ties the transport, router, position tracking and
//! pitch analysis together behind the seams the host application drives.
//!
//! Execution contexts:
//! - The host's single-threaded tick context calls [`CompanionClient::tick`]
//!   and owns the recorder; deferred server requests are consumed there.
//! - The capture subsystem's callback context calls
//!   [`CompanionClient::handle_new_samples`].
//! - The transport's receive/probe threads never touch the recorder.

use crate::analysis::{beats_to_analyze, sample_window_for_beat, AudioSamplesAnalyzer};
use crate::clock::{Clock, SystemClock};
use crate::config::MicProfile;
use crate::lock_or_recover;
use crate::log_debug;
use crate::song::PositionTracker;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use super::protocol::{BeatPitchEventDto, ClientMessage};
use super::router::{PendingActions, ProtocolRouter};
use super::transport::SessionTransport;

/// Result of the discovery handshake. Discovery itself is an external
/// collaborator; we only consume its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectEvent {
    pub is_success: bool,
    pub messaging_port: u16,
    pub server_address: Option<IpAddr>,
}

/// New microphone samples from the capture subsystem.
///
/// `samples` is the capture buffer in chronological order with the newest
/// sample last; `new_samples_start..new_samples_end` is the range added since
/// the previous event.
#[derive(Debug)]
pub struct RecordingEvent<'a> {
    pub samples: &'a [f32],
    pub new_samples_start: usize,
    pub new_samples_end: usize,
    pub sample_rate: u32,
}

/// Recorder operations that must run on the owner's tick context.
pub trait RecordingControl {
    fn start_recording(&mut self);
    fn stop_recording(&mut self);
}

/// The companion-side pitch streaming client.
pub struct CompanionClient {
    transport: SessionTransport,
    tracker: Arc<Mutex<PositionTracker>>,
    mic_profile: Arc<Mutex<MicProfile>>,
    pending: Arc<PendingActions>,
    clock: Arc<dyn Clock>,
    analyzer: Box<dyn AudioSamplesAnalyzer>,
}

impl CompanionClient {
    pub fn new(
        mic_profile: MicProfile,
        analyzer: Box<dyn AudioSamplesAnalyzer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tracker = Arc::new(Mutex::new(PositionTracker::new()));
        let mic_profile = Arc::new(Mutex::new(mic_profile));
        let pending = Arc::new(PendingActions::default());
        let router = ProtocolRouter::new(
            Arc::clone(&tracker),
            Arc::clone(&mic_profile),
            Arc::clone(&pending),
            Arc::clone(&clock),
        );
        let transport = SessionTransport::start(router, Arc::clone(&clock));
        Self {
            transport,
            tracker,
            mic_profile,
            pending,
            clock,
            analyzer,
        }
    }

    pub fn with_system_clock(
        mic_profile: MicProfile,
        analyzer: Box<dyn AudioSamplesAnalyzer>,
    ) -> Self {
        Self::new(mic_profile, analyzer, Arc::new(SystemClock))
    }

    /// Apply a discovery outcome. Success opens a fresh messaging connection;
    /// anything else tears the connection down and schedules a recording stop
    /// for the owner's next tick.
    pub fn handle_connect_event(&self, event: &ConnectEvent) {
        let endpoint = match (event.is_success, event.messaging_port, event.server_address) {
            (true, port, Some(address)) if port > 0 => SocketAddr::new(address, port),
            _ => {
                self.transport.close();
                self.pending.request_stop_recording();
                return;
            }
        };
        if let Err(err) = self.transport.connect(endpoint) {
            log_debug(&format!("Connect to {endpoint} failed: {err:#}"));
        }
    }

    /// Per-tick processing on the owner's context: consume deferred recording
    /// requests and reset position tracking once it went stale.
    pub fn tick(&self, recording: &mut dyn RecordingControl) {
        if self.pending.take_stop_recording() {
            log_debug("Stopping recording because of message from server");
            lock_or_recover(&self.tracker, "tick stop recording").reset();
            recording.stop_recording();
        }
        if self.pending.take_start_recording() {
            log_debug("Starting recording because of message from server");
            recording.start_recording();
        }

        let now = self.clock.now_unix_millis();
        let mut tracker = lock_or_recover(&self.tracker, "tick stale check");
        if tracker.has_position() && tracker.is_stale(now) {
            // No position update for a while; probably not in the sing scene
            // anymore. Lost position is not an error.
            log_debug("Position in song went stale, resetting");
            tracker.reset();
        }
    }

    /// On recording start with a known position, analyze only future beats.
    pub fn handle_recording_state_changed(&self, is_recording: bool) {
        if !is_recording {
            return;
        }
        let now = self.clock.now_unix_millis();
        let mut tracker = lock_or_recover(&self.tracker, "recording state change");
        if tracker.has_position() {
            tracker.skip_to_current_beat(now);
        }
    }

    /// Analyze new microphone samples and stream the results. With a known
    /// song position this is beat catch-up analysis; without one, only the
    /// newest window is analyzed (beat -1).
    pub fn handle_new_samples(&mut self, event: &RecordingEvent<'_>) {
        if !self.transport.is_connected() {
            return;
        }
        let has_position =
            lock_or_recover(&self.tracker, "sample handler position check").has_position();
        if has_position {
            self.analyze_beats(event);
        } else {
            self.analyze_newest(event);
        }
    }

    fn analyze_beats(&mut self, event: &RecordingEvent<'_>) {
        let now = self.clock.now_unix_millis();
        let mic_delay_millis =
            f64::from(lock_or_recover(&self.mic_profile, "mic delay").delay_in_millis);

        // The tracker lock is held through analysis so a concurrent cursor
        // rewind from the router cannot be overwritten by our cursor update.
        let mut tracker = lock_or_recover(&self.tracker, "beat analysis");
        let (Some(estimate), Some(timing)) = (tracker.estimate_now_millis(now), tracker.timing())
        else {
            return;
        };
        let Some(range) =
            beats_to_analyze(tracker.last_analyzed_beat(), estimate, mic_delay_millis, &timing)
        else {
            return;
        };

        let mut events = Vec::with_capacity((range.end() - range.start() + 1) as usize);
        for beat in range.clone() {
            let midi_note = sample_window_for_beat(
                &timing,
                beat,
                estimate,
                event.sample_rate,
                event.samples.len(),
            )
            .and_then(|window| {
                self.analyzer
                    .process_samples(&event.samples[window], event.sample_rate)
            })
            .map(|pitch| pitch.midi_note)
            .unwrap_or(-1);
            events.push(BeatPitchEventDto { midi_note, beat });
        }

        if events.len() > 3 {
            log_debug(&format!(
                "Sending {} beats to server in one batch (catch-up)",
                events.len()
            ));
        }
        if let Err(err) = self.transport.send(&ClientMessage::BeatPitchEvents {
            beat_pitch_events: events,
        }) {
            log_debug(&format!("Failed to send pitch to server: {err:#}"));
        }
        // Advance past capped-away beats too; lost beats are dropped, not
        // queued indefinitely.
        tracker.mark_analyzed_up_to(*range.end());
    }

    fn analyze_newest(&mut self, event: &RecordingEvent<'_>) {
        let start = event.new_samples_start.min(event.samples.len());
        let end = event.new_samples_end.min(event.samples.len());
        let midi_note = if start < end {
            self.analyzer
                .process_samples(&event.samples[start..end], event.sample_rate)
                .map(|pitch| pitch.midi_note)
                .unwrap_or(-1)
        } else {
            -1
        };
        let message = ClientMessage::BeatPitchEvents {
            beat_pitch_events: vec![BeatPitchEventDto { midi_note, beat: -1 }],
        };
        if let Err(err) = self.transport.send(&message) {
            log_debug(&format!("Failed to send pitch to server: {err:#}"));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn has_position(&self) -> bool {
        lock_or_recover(&self.tracker, "has_position").has_position()
    }

    pub fn mic_profile(&self) -> MicProfile {
        lock_or_recover(&self.mic_profile, "mic_profile snapshot").clone()
    }

    /// Stop background loops deterministically. Also runs on Drop.
    pub fn shutdown(&mut self) {
        self.transport.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &SessionTransport {
        &self.transport
    }

    #[cfg(test)]
    pub(crate) fn tracker(&self) -> &Arc<Mutex<PositionTracker>> {
        &self.tracker
    }
}
