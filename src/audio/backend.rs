use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::capture::CaptureError;

/// One block of captured audio (32-bit float, mono)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Position of this frame in the capture, starting at 0
    pub sequence: u64,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Copy a mono buffer into a new frame
    pub fn from_samples(samples: &[f32], sample_rate: u32, sequence: u64) -> Self {
        let offset_samples = sequence * samples.len() as u64;
        let timestamp_ms = if sample_rate == 0 {
            0
        } else {
            offset_samples * 1000 / sample_rate as u64
        };

        Self {
            samples: samples.to_vec(),
            sample_rate,
            channels: 1,
            sequence,
            timestamp_ms,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels.max(1) as f64)
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBackendConfig {
    /// Target sample rate (will resample if needed)
    pub target_sample_rate: u32,
    /// Target channel count (frames are always mono)
    pub target_channels: u16,
    /// Samples per frame delivered to the sink
    pub frame_size: usize,
    /// Input device name; host default when `None`
    pub device: Option<String>,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz for Whisper
            target_channels: 1,        // Mono
            frame_size: 4096,          // one processing interval
            device: None,
        }
    }
}

impl AudioBackendConfig {
    pub fn frame_duration_ms(&self) -> u64 {
        self.frame_size as u64 * 1000 / self.target_sample_rate.max(1) as u64
    }
}

/// Receiver of assembled frames, invoked from the capture thread
pub trait FrameSink: Send + Sync {
    /// Read synchronously on every callback
    fn is_active(&self) -> bool;

    /// Offer one frame; the sink copies it. Returns false if it was dropped.
    fn push(&self, samples: &[f32]) -> bool;
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default (or named) input device
/// - File: replay a WAV file (headless runs, tests)
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire the device and start delivering frames to `sink`
    async fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), CaptureError>;

    /// Stop capturing and release the device. Safe to call twice.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Creates a fresh backend for each recording attempt
pub type BackendProvider =
    Arc<dyn Fn(&AudioBackendConfig) -> Result<Box<dyn AudioBackend>, CaptureError> + Send + Sync>;

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Microphone input (all platforms)
    Microphone,
    /// WAV file input, paced at real time
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend based on source and configuration
    pub fn create(
        source: &AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>, CaptureError> {
        match source {
            AudioSource::Microphone => Ok(Box::new(super::MicrophoneBackend::new(config))),
            AudioSource::File(path) => Ok(Box::new(super::FileBackend::new(path, config)?)),
        }
    }

    /// Provider that builds a backend for `source` on every attempt
    pub fn provider(source: AudioSource) -> BackendProvider {
        Arc::new(move |config: &AudioBackendConfig| Self::create(&source, config.clone()))
    }
}
