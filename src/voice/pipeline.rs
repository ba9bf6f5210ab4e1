//! Capture pipeline state machine
//!
//! `Idle → Recording → Idle`. A capture ends exactly once, whether the user
//! released the button or the duration cap expired first; the loser of that
//! race is a no-op. Each capture gets a generation token so an auto-stop
//! timer left over from an earlier capture can never terminate a newer one.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::voice::capture::{Recorder, SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// Maximum voice note duration in milliseconds
pub const MAX_CAPTURE_MS: u64 = 5000;

/// Capture pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No capture in progress
    Idle,
    /// Microphone held, accumulating fragments
    Recording,
}

/// Why a capture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user released the record control
    UserInitiated,
    /// The duration cap expired
    TimeoutExpired,
}

/// One completed voice note, packaged for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePayload {
    /// WAV-encoded audio (possibly zero frames)
    pub wav: Vec<u8>,
    /// Wall-clock capture duration
    pub duration: Duration,
}

/// Bounded-duration capture pipeline over a [`Recorder`] capability
pub struct CapturePipeline<R: Recorder> {
    recorder: R,
    state: CaptureState,
    started_at: Option<Instant>,
    generation: u64,
    max_duration: Duration,
}

impl<R: Recorder> CapturePipeline<R> {
    /// Create a pipeline with the default duration cap
    pub fn new(recorder: R) -> Self {
        Self::with_max_duration(recorder, Duration::from_millis(MAX_CAPTURE_MS))
    }

    /// Create a pipeline with a custom duration cap
    pub fn with_max_duration(recorder: R, max_duration: Duration) -> Self {
        Self {
            recorder,
            state: CaptureState::Idle,
            started_at: None,
            generation: 0,
            max_duration,
        }
    }

    /// Begin a capture, returning the generation token for its auto-stop
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if a capture is already in progress, or the
    /// recorder's error (state stays `Idle`) if the device is unavailable
    pub fn begin(&mut self) -> Result<u64> {
        if self.state == CaptureState::Recording {
            return Err(Error::Capture("capture already in progress".to_string()));
        }

        self.recorder.begin()?;
        self.generation += 1;
        self.state = CaptureState::Recording;
        self.started_at = Some(Instant::now());

        tracing::debug!(generation = self.generation, "capture started");
        Ok(self.generation)
    }

    /// End the current capture, packaging fragments into one payload
    ///
    /// Returns `None` when no capture is in progress, which makes a
    /// concurrent double-stop a no-op. An empty capture still yields a
    /// (zero-frame) payload.
    pub fn end(&mut self, reason: StopReason) -> Option<VoicePayload> {
        if self.state != CaptureState::Recording {
            return None;
        }

        let samples = self.recorder.stop();
        let duration = self
            .started_at
            .take()
            .map_or(Duration::ZERO, |t| t.elapsed());
        self.state = CaptureState::Idle;

        let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "failed to package capture");
                return None;
            }
        };

        tracing::info!(
            ?reason,
            samples = samples.len(),
            bytes = wav.len(),
            "capture complete"
        );

        Some(VoicePayload { wav, duration })
    }

    /// End the capture only if `generation` is still the active one
    ///
    /// Auto-stop timers call this so a timer that outlived its capture
    /// cannot fire against a newer recording.
    pub fn end_if_generation(
        &mut self,
        generation: u64,
        reason: StopReason,
    ) -> Option<VoicePayload> {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "stale auto-stop ignored");
            return None;
        }
        self.end(reason)
    }

    /// Run one full capture: begin, then race the user's release against
    /// the duration cap
    ///
    /// Whichever side loses the race is a no-op; exactly one payload is
    /// produced per capture, with the reason that ended it.
    ///
    /// # Errors
    ///
    /// Returns the `begin` error if the capture cannot start
    pub async fn capture_until<F>(
        &mut self,
        released: F,
    ) -> Result<Option<(VoicePayload, StopReason)>>
    where
        F: Future<Output = ()>,
    {
        let generation = self.begin()?;
        let cap = self.max_duration;

        let payload = tokio::select! {
            () = released => self
                .end(StopReason::UserInitiated)
                .map(|payload| (payload, StopReason::UserInitiated)),
            () = tokio::time::sleep(cap) => self
                .end_if_generation(generation, StopReason::TimeoutExpired)
                .map(|payload| (payload, StopReason::TimeoutExpired)),
        };

        Ok(payload)
    }

    /// Current pipeline state
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Whether a capture is in progress
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// The configured duration cap
    #[must_use]
    pub const fn max_duration(&self) -> Duration {
        self.max_duration
    }
}
