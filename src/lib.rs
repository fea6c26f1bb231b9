//! micbridge: companion-device live pitch-streaming client.
//!
//! A phone-side client that analyzes sung pitch from microphone sample
//! buffers and streams it to the main karaoke game over a persistent
//! newline-delimited JSON session, while the game pushes song positions and
//! configuration back. Microphone capture, pitch detection DSP and server
//! discovery are external collaborators behind the seams in [`session`] and
//! [`analysis`].

pub mod analysis;
pub mod clock;
pub mod config;
mod lock;
mod logging;
pub mod session;
pub mod song;
pub mod telemetry;

pub(crate) use lock::lock_or_recover;
pub use logging::{init_logging, log_debug, log_debug_content, log_file_path};
