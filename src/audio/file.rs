use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::WavReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::assembler::FrameAssembler;
use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, FrameSink};
use crate::capture::CaptureError;

/// Decoded WAV file, samples normalised to f32 and interleaved
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels.max(1) as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono frames of `config.frame_size` at the target rate; a trailing
    /// partial frame is dropped
    pub fn frames(&self, config: &AudioBackendConfig) -> Vec<Vec<f32>> {
        let mut assembler = FrameAssembler::new(
            self.channels,
            self.sample_rate,
            config.target_sample_rate,
            config.frame_size,
        );

        let mut frames = Vec::new();
        assembler.push(&self.samples, |frame| frames.push(frame.to_vec()));
        frames
    }
}

/// Write captured frames as one mono 32-bit float WAV file
pub fn write_wav(path: impl AsRef<Path>, frames: &[AudioFrame]) -> Result<usize> {
    let path = path.as_ref();
    let sample_rate = frames.first().map(|f| f.sample_rate).unwrap_or(16000);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

    let mut sample_count = 0;
    for frame in frames {
        for &sample in &frame.samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        sample_count += frame.samples.len();
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    info!(
        "Saved recording to {} ({} frames, {} samples)",
        path.display(),
        frames.len(),
        sample_count
    );

    Ok(sample_count)
}

/// Replays a WAV file as if it were a microphone
pub struct FileBackend {
    config: AudioBackendConfig,
    frames: Arc<Vec<Vec<f32>>>,
    /// Sleep one frame interval between frames
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self, CaptureError> {
        let file = AudioFile::open(path).map_err(|e| CaptureError::DeviceAccess(format!("{:#}", e)))?;
        let frames = file.frames(&config);

        Ok(Self {
            config,
            frames: Arc::new(frames),
            realtime: true,
            task: None,
        })
    }

    /// Deliver all frames as fast as the sink accepts them
    pub fn without_pacing(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), CaptureError> {
        if self.task.is_some() {
            warn!("File backend already playing");
            return Ok(());
        }

        let frames = Arc::clone(&self.frames);
        let interval = Duration::from_millis(self.config.frame_duration_ms());
        let realtime = self.realtime;

        info!("Replaying {} frames from file", frames.len());

        self.task = Some(tokio::spawn(async move {
            for frame in frames.iter() {
                if realtime {
                    tokio::time::sleep(interval).await;
                }
                if !sink.is_active() {
                    break;
                }
                sink.push(frame);
            }
            info!("File replay finished");
        }));

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "wav file"
    }
}
