//! Wire protocol between the companion client and the main game.
//!
//! Every message is one newline-delimited JSON object with a `MessageType`
//! tag field for type discrimination. Unknown tags are ignored by the router
//! so newer servers stay compatible with older clients.

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Messages (game → companion)
// ============================================================================

/// Messages pushed by the main game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "MessageType")]
pub enum ServerMessage {
    /// Liveness probe; carrying data at all already proves the connection.
    StillAliveCheck,

    /// Current playback position plus the timing needed to map it to beats.
    #[serde(rename_all = "camelCase")]
    PositionInSong {
        position_in_song_in_millis: f64,
        song_bpm: f64,
        song_gap: f64,
    },

    /// Replacement microphone profile chosen on the game side.
    #[serde(rename_all = "camelCase")]
    MicProfile {
        amplification: i32,
        noise_suppression: i32,
        sample_rate: i32,
        delay_in_millis: i32,
        hex_color: String,
    },

    /// Stop capturing; must be acted on from the owner's tick context.
    StopRecording,

    /// Start capturing; must be acted on from the owner's tick context.
    StartRecording,
}

// ============================================================================
// Client Messages (companion → game)
// ============================================================================

/// Messages sent to the main game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "MessageType")]
pub enum ClientMessage {
    /// Outbound liveness probe; a failed send reveals a dead peer.
    StillAliveCheck,

    /// Batch of per-beat pitch detection results.
    #[serde(rename_all = "camelCase")]
    BeatPitchEvents {
        beat_pitch_events: Vec<BeatPitchEventDto>,
    },
}

/// One analyzed beat. `beat` is -1 in newest-window mode (no song position
/// known); `midi_note` is -1 when no pitch was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatPitchEventDto {
    pub midi_note: i32,
    pub beat: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn still_alive_check_serializes_to_tag_only_object() {
        let json = serde_json::to_string(&ClientMessage::StillAliveCheck).unwrap();
        assert_eq!(json, r#"{"MessageType":"StillAliveCheck"}"#);
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClientMessage::StillAliveCheck);
    }

    #[test]
    fn position_in_song_decodes_camel_case_fields() {
        let json = r#"{"MessageType":"PositionInSong","positionInSongInMillis":1234.5,"songBpm":120.0,"songGap":300.0}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ServerMessage::PositionInSong {
                position_in_song_in_millis: 1234.5,
                song_bpm: 120.0,
                song_gap: 300.0,
            }
        );
    }

    #[test]
    fn mic_profile_decodes_all_fields() {
        let json = r##"{"MessageType":"MicProfile","amplification":6,"noiseSuppression":10,"sampleRate":44100,"delayInMillis":140,"hexColor":"#AB47BC"}"##;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::MicProfile {
                amplification,
                noise_suppression,
                sample_rate,
                delay_in_millis,
                hex_color,
            } => {
                assert_eq!(amplification, 6);
                assert_eq!(noise_suppression, 10);
                assert_eq!(sample_rate, 44_100);
                assert_eq!(delay_in_millis, 140);
                assert_eq!(hex_color, "#AB47BC");
            }
            other => panic!("expected MicProfile, got {other:?}"),
        }
    }

    #[test]
    fn beat_pitch_events_round_trip_with_sentinel_values() {
        let msg = ClientMessage::BeatPitchEvents {
            beat_pitch_events: vec![BeatPitchEventDto {
                midi_note: -1,
                beat: -1,
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""midiNote":-1"#));
        assert!(json.contains(r#""beat":-1"#));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn unknown_message_type_fails_typed_decode() {
        let json = r#"{"MessageType":"SomethingNew","value":1}"#;
        assert!(serde_json::from_str::<ServerMessage>(json).is_err());
    }
}
