//! micbridge entrypoint: a headless harness that drives the companion client
//! against a configured game server.
//!
//! Real deployments embed [`CompanionClient`] behind the host app's capture
//! and discovery subsystems; this binary substitutes both with CLI flags (a
//! fixed endpoint, an optional synthetic tone) so the session protocol can be
//! exercised end to end from a shell.
//!
//! # Architecture
//!
//! - Producer thread: generates capture frames, hands them over a bounded
//!   channel (full channel drops the frame, never blocks the producer)
//! - Main loop: consumes frames, maintains the rolling capture buffer, runs
//!   the client tick and triggers reconnects

use anyhow::{bail, Result};
use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TrySendError};
use micbridge::analysis::ZeroCrossingAnalyzer;
use micbridge::config::AppConfig;
use micbridge::session::{CompanionClient, ConnectEvent, RecordingControl, RecordingEvent};
use micbridge::telemetry::init_tracing;
use micbridge::{init_logging, log_debug, log_file_path};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Max capture frames queued between the producer and the main loop.
const FRAME_CHANNEL_CAPACITY: usize = 16;

/// One capture frame worth of audio.
const FRAME_MILLIS: u64 = 100;

/// Rolling buffer length handed to beat analysis.
const CAPTURE_BUFFER_MILLIS: u64 = 2_000;

/// How long to wait between reconnect attempts after a connection loss.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let config = AppConfig::parse();
    init_logging(&config);
    init_tracing(&config);

    let Some(server_host) = config.server_host else {
        bail!("--server-host is required (discovery is not part of this harness)");
    };

    if config.logs && !config.no_logs {
        eprintln!("micbridge: debug log at {}", log_file_path().display());
    }

    let mut client = CompanionClient::with_system_clock(
        config.initial_mic_profile(),
        Box::new(ZeroCrossingAnalyzer::default()),
    );

    let connect_event = ConnectEvent {
        is_success: true,
        messaging_port: config.server_port,
        server_address: Some(server_host),
    };
    client.handle_connect_event(&connect_event);
    if !client.is_connected() {
        bail!("could not connect to {server_host}:{}", config.server_port);
    }
    eprintln!(
        "micbridge: connected to {server_host}:{}",
        config.server_port
    );

    let recording = Arc::new(AtomicBool::new(false));
    let dropped_frames = Arc::new(AtomicUsize::new(0));
    let (frame_tx, frame_rx) = bounded::<Vec<f32>>(FRAME_CHANNEL_CAPACITY);
    spawn_tone_producer(
        &config,
        frame_tx,
        Arc::clone(&recording),
        Arc::clone(&dropped_frames),
    );

    let buffer_capacity = (config.sample_rate as u64 * CAPTURE_BUFFER_MILLIS / 1_000) as usize;
    let mut capture_buffer: Vec<f32> = Vec::with_capacity(buffer_capacity);
    let mut recorder = ToneRecorder {
        recording: Arc::clone(&recording),
    };
    let mut last_reconnect_attempt = Instant::now();
    let mut was_recording = false;

    loop {
        client.tick(&mut recorder);

        let is_recording = recording.load(Ordering::Relaxed);
        if is_recording != was_recording {
            if !is_recording {
                capture_buffer.clear();
            }
            client.handle_recording_state_changed(is_recording);
            was_recording = is_recording;
        }

        if !client.is_connected() && last_reconnect_attempt.elapsed() >= RECONNECT_INTERVAL {
            last_reconnect_attempt = Instant::now();
            log_debug("Connection lost, attempting reconnect");
            client.handle_connect_event(&connect_event);
        }

        match frame_rx.recv_timeout(Duration::from_millis(FRAME_MILLIS / 2)) {
            Ok(frame) => {
                let new_samples = frame.len();
                capture_buffer.extend_from_slice(&frame);
                let overflow = capture_buffer.len().saturating_sub(buffer_capacity);
                if overflow > 0 {
                    capture_buffer.drain(..overflow);
                }
                client.handle_new_samples(&RecordingEvent {
                    samples: &capture_buffer,
                    new_samples_start: capture_buffer.len().saturating_sub(new_samples),
                    new_samples_end: capture_buffer.len(),
                    sample_rate: config.sample_rate,
                });
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let dropped = dropped_frames.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            log_debug(&format!("Dropped {dropped} capture frames (main loop busy)"));
        }
    }

    client.shutdown();
    Ok(())
}

/// Recorder seam for the harness: "recording" just gates the tone producer.
struct ToneRecorder {
    recording: Arc<AtomicBool>,
}

impl RecordingControl for ToneRecorder {
    fn start_recording(&mut self) {
        self.recording.store(true, Ordering::Relaxed);
        eprintln!("micbridge: recording started (server request)");
    }

    fn stop_recording(&mut self) {
        self.recording.store(false, Ordering::Relaxed);
        eprintln!("micbridge: recording stopped (server request)");
    }
}

/// Produce capture frames in real time: a sine tone at the configured
/// frequency, or silence when none was given. Frames the main loop cannot
/// keep up with are dropped and counted, never queued unboundedly.
fn spawn_tone_producer(
    config: &AppConfig,
    sender: Sender<Vec<f32>>,
    recording: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
) {
    let sample_rate = config.sample_rate;
    let tone_hz = config.synth_tone_hz;
    let frame_samples = (u64::from(sample_rate) * FRAME_MILLIS / 1_000).max(1) as usize;

    let _ = thread::Builder::new()
        .name("micbridge-producer".to_string())
        .spawn(move || {
            let mut phase = 0.0f32;
            let phase_step = tone_hz
                .map(|hz| 2.0 * std::f32::consts::PI * hz / sample_rate as f32)
                .unwrap_or(0.0);
            loop {
                thread::sleep(Duration::from_millis(FRAME_MILLIS));
                if !recording.load(Ordering::Relaxed) {
                    continue;
                }
                let frame: Vec<f32> = (0..frame_samples)
                    .map(|_| {
                        let sample = if phase_step > 0.0 { phase.sin() * 0.5 } else { 0.0 };
                        phase = (phase + phase_step) % (2.0 * std::f32::consts::PI);
                        sample
                    })
                    .collect();
                match sender.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        });
}
