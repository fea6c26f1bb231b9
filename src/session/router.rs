//! Inbound message dispatch.
//!
//! Runs on the receive thread. Anything that must execute on the owner's
//! single-threaded tick context (recording start/stop) is deferred through
//! [`PendingActions`] flags instead of being acted on here.

use crate::clock::Clock;
use crate::config::MicProfile;
use crate::lock_or_recover;
use crate::song::PositionTracker;
use crate::{log_debug, log_debug_content};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::protocol::ServerMessage;

// ============================================================================
// Deferred Actions
// ============================================================================

/// Recording start/stop requested by the server. The receive thread only sets
/// these; the owner consumes them on its next tick, because the recorder must
/// not be touched from a background thread.
#[derive(Debug, Default)]
pub struct PendingActions {
    stop_recording: AtomicBool,
    start_recording: AtomicBool,
}

impl PendingActions {
    pub fn request_stop_recording(&self) {
        self.stop_recording.store(true, Ordering::SeqCst);
    }

    pub fn request_start_recording(&self) {
        self.start_recording.store(true, Ordering::SeqCst);
    }

    /// Consume the stop flag; true at most once per request.
    pub fn take_stop_recording(&self) -> bool {
        self.stop_recording.swap(false, Ordering::SeqCst)
    }

    /// Consume the start flag; true at most once per request.
    pub fn take_start_recording(&self) -> bool {
        self.start_recording.swap(false, Ordering::SeqCst)
    }
}

// ============================================================================
// Router
// ============================================================================

/// Decodes inbound lines and dispatches them to the shared client state.
/// Malformed or unknown input is logged and dropped; nothing here may crash
/// the receive loop.
pub struct ProtocolRouter {
    tracker: Arc<Mutex<PositionTracker>>,
    mic_profile: Arc<Mutex<MicProfile>>,
    pending: Arc<PendingActions>,
    clock: Arc<dyn Clock>,
}

impl ProtocolRouter {
    pub fn new(
        tracker: Arc<Mutex<PositionTracker>>,
        mic_profile: Arc<Mutex<MicProfile>>,
        pending: Arc<PendingActions>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            mic_profile,
            pending,
            clock,
        }
    }

    pub fn handle_line(&self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        // Cheap plausibility gate before any decode attempt.
        if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
            log_debug_content(&format!("Received invalid message from server: {trimmed}"));
            log_debug("Dropped non-JSON line from server");
            return;
        }

        match serde_json::from_str::<ServerMessage>(trimmed) {
            Ok(message) => self.dispatch(message),
            Err(err) => self.log_decode_failure(trimmed, &err),
        }
    }

    fn dispatch(&self, message: ServerMessage) {
        match message {
            // Receipt alone proves the connection is alive.
            ServerMessage::StillAliveCheck => {}
            ServerMessage::PositionInSong {
                position_in_song_in_millis,
                song_bpm,
                song_gap,
            } => {
                log_debug_content(&format!(
                    "Received position in song: {position_in_song_in_millis}ms (bpm {song_bpm}, gap {song_gap})"
                ));
                let now = self.clock.now_unix_millis();
                let mut tracker = lock_or_recover(&self.tracker, "router position update");
                tracker.handle_position_report(
                    position_in_song_in_millis,
                    song_bpm,
                    song_gap,
                    now,
                );
            }
            ServerMessage::MicProfile {
                amplification,
                noise_suppression,
                sample_rate,
                delay_in_millis,
                hex_color,
            } => {
                log_debug("Received new mic profile");
                let mut profile = lock_or_recover(&self.mic_profile, "router mic profile");
                *profile = MicProfile {
                    amplification,
                    noise_suppression,
                    sample_rate,
                    delay_in_millis,
                    hex_color,
                };
            }
            ServerMessage::StopRecording => {
                self.pending.request_stop_recording();
            }
            ServerMessage::StartRecording => {
                self.pending.request_start_recording();
            }
        }
    }

    /// Distinguish a forward-compatible unknown `MessageType` from a
    /// genuinely undecodable line; both are dropped.
    fn log_decode_failure(&self, line: &str, err: &serde_json::Error) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            if let Some(message_type) = value.get("MessageType").and_then(|v| v.as_str()) {
                if !KNOWN_MESSAGE_TYPES.contains(&message_type) {
                    log_debug(&format!("Ignoring unknown MessageType {message_type}"));
                    return;
                }
            }
        }
        log_debug(&format!("Failed to decode message from server: {err}"));
        log_debug_content(&format!("Undecodable line: {line}"));
    }
}

const KNOWN_MESSAGE_TYPES: [&str; 5] = [
    "StillAliveCheck",
    "PositionInSong",
    "MicProfile",
    "StopRecording",
    "StartRecording",
];
