//! Command-line configuration and runtime microphone settings.

use clap::Parser;
use std::net::IpAddr;

pub const DEFAULT_MESSAGING_PORT: u16 = 34_567;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_MIC_DELAY_MILLIS: i32 = 140;
pub const DEFAULT_NOISE_SUPPRESSION: i32 = 5;

/// CLI options for the micbridge client harness.
#[derive(Debug, Parser, Clone)]
#[command(about = "micbridge companion pitch-streaming client", author, version)]
pub struct AppConfig {
    /// Game server address (normally delivered by discovery)
    #[arg(long = "server-host")]
    pub server_host: Option<IpAddr>,

    /// Messaging port on the game server
    #[arg(long = "server-port", default_value_t = DEFAULT_MESSAGING_PORT)]
    pub server_port: u16,

    /// Capture sample rate reported with analyzed windows
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Initial microphone delay compensation (milliseconds)
    #[arg(long = "mic-delay-ms", default_value_t = DEFAULT_MIC_DELAY_MILLIS)]
    pub mic_delay_ms: i32,

    /// Initial microphone amplification (dB steps, game-side convention)
    #[arg(long = "amplification", default_value_t = 0)]
    pub amplification: i32,

    /// Initial noise suppression level
    #[arg(long = "noise-suppression", default_value_t = DEFAULT_NOISE_SUPPRESSION)]
    pub noise_suppression: i32,

    /// Feed a synthetic sine tone of this frequency instead of real capture
    #[arg(long = "synth-tone-hz")]
    pub synth_tone_hz: Option<f32>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "MICBRIDGE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "MICBRIDGE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging message payload snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "MICBRIDGE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

impl AppConfig {
    pub fn initial_mic_profile(&self) -> MicProfile {
        MicProfile {
            amplification: self.amplification,
            noise_suppression: self.noise_suppression,
            sample_rate: self.sample_rate as i32,
            delay_in_millis: self.mic_delay_ms,
            hex_color: MicProfile::default().hex_color,
        }
    }
}

/// Microphone settings. The game replaces this wholesale via a `MicProfile`
/// message; only `delay_in_millis` feeds the beat scheduling itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicProfile {
    pub amplification: i32,
    pub noise_suppression: i32,
    /// 0 means "best available"; the capture side substitutes the real rate.
    pub sample_rate: i32,
    pub delay_in_millis: i32,
    pub hex_color: String,
}

impl Default for MicProfile {
    fn default() -> Self {
        Self {
            amplification: 0,
            noise_suppression: DEFAULT_NOISE_SUPPRESSION,
            sample_rate: 0,
            delay_in_millis: DEFAULT_MIC_DELAY_MILLIS,
            hex_color: "#FFFFFF".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_arguments() {
        let config = AppConfig::parse_from(["micbridge"]);
        assert_eq!(config.server_port, DEFAULT_MESSAGING_PORT);
        assert_eq!(config.mic_delay_ms, DEFAULT_MIC_DELAY_MILLIS);
        assert!(config.server_host.is_none());
        assert!(!config.logs);
    }

    #[test]
    fn initial_mic_profile_reflects_flags() {
        let config =
            AppConfig::parse_from(["micbridge", "--mic-delay-ms", "250", "--amplification", "6"]);
        let profile = config.initial_mic_profile();
        assert_eq!(profile.delay_in_millis, 250);
        assert_eq!(profile.amplification, 6);
    }
}
