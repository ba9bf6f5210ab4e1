//! Microphone capture
//!
//! `Recorder` is the capability boundary: the capture pipeline in
//! `pipeline.rs` is written against it so the state machine can be exercised
//! without audio hardware.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for voice notes (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Recording device capability
///
/// One capture session holds the device exclusively; `stop` must release it
/// on every exit path and return whatever fragments accumulated.
pub trait Recorder {
    /// Acquire the device and begin accumulating fragments
    ///
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied` if the device is unavailable
    fn begin(&mut self) -> Result<()>;

    /// Flush buffered fragments, release the device, and return the samples
    ///
    /// Idempotent: calling while not recording returns an empty buffer.
    fn stop(&mut self) -> Vec<f32>;

    /// Whether a capture is currently holding the device
    fn is_recording(&self) -> bool;
}

/// Captures audio from the default input device
pub struct MicRecorder {
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl MicRecorder {
    /// Create a new microphone recorder
    ///
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied` if no suitable input device exists
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::PermissionDenied("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::PermissionDenied(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "microphone recorder initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    fn open_device() -> Result<Device> {
        cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::PermissionDenied("no input device".to_string()))
    }
}

impl Recorder for MicRecorder {
    fn begin(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::Capture("capture already in progress".to_string()));
        }

        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        let buffer = Arc::clone(&self.buffer);
        let device = Self::open_device()?;
        let config = self.config.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "microphone capture error");
                },
                None,
            )
            .map_err(|e| Error::PermissionDenied(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("microphone capture started");
        Ok(())
    }

    fn stop(&mut self) -> Vec<f32> {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("microphone released");
        }

        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for MicRecorder {
    fn drop(&mut self) {
        // Release the device even if the pipeline never stopped us
        let _ = self.stop();
    }
}

/// Convert f32 samples to WAV bytes for transmission
///
/// Zero samples still produce a valid (empty) WAV so voice sends stay
/// uniform with text sends.
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
