//! Voice capture and playback
//!
//! Capture goes through a portable state machine (`pipeline`) over a
//! platform `Recorder` capability; playback decodes server voice replies.

mod capture;
mod pipeline;
mod playback;

pub use capture::{MicRecorder, Recorder, SAMPLE_RATE, samples_to_wav};
pub use pipeline::{CapturePipeline, CaptureState, MAX_CAPTURE_MS, StopReason, VoicePayload};
pub use playback::AudioPlayback;
