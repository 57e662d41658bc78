// Microphone backend built on cpal
//
// `cpal::Stream` is not `Send`, so the stream lives on a dedicated capture
// thread for its whole life. The thread reports start-up success or failure
// through a oneshot, then parks until it is told to stop (or the backend is
// dropped) and drops the stream, which releases the device.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::assembler::FrameAssembler;
use super::backend::{AudioBackend, AudioBackendConfig, FrameSink};
use crate::capture::CaptureError;

/// How long to wait for the OS to hand over the device
const DEVICE_START_TIMEOUT: Duration = Duration::from_secs(5);

struct CaptureThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl CaptureThread {
    fn shutdown(self) -> thread::JoinHandle<()> {
        let _ = self.stop_tx.send(());
        self.handle
    }
}

/// Captures the default (or configured) input device
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    worker: Option<CaptureThread>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            worker: None,
        }
    }

    /// Names of the available input devices
    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::DeviceAccess(e.to_string()))?;

        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            warn!("Microphone backend dropped while capturing; releasing device");
            if worker.shutdown().join().is_err() {
                error!("Capture thread panicked during teardown");
            }
        }
    }
}

#[async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            warn!("Microphone already capturing");
            return Ok(());
        }

        let config = self.config.clone();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String, CaptureError>>();

        let handle = thread::Builder::new()
            .name("handscribe-capture".to_string())
            .spawn(move || run_capture(config, sink, ready_tx, stop_rx))
            .map_err(|e| CaptureError::Stream(format!("Failed to spawn capture thread: {}", e)))?;

        let worker = CaptureThread { stop_tx, handle };

        let outcome = match tokio::time::timeout(DEVICE_START_TIMEOUT, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CaptureError::Stream(
                "Capture thread exited before the device started".to_string(),
            )),
            Err(_) => Err(CaptureError::DeviceAccess(
                "Timed out waiting for the microphone".to_string(),
            )),
        };

        match outcome {
            Ok(device_name) => {
                info!(
                    "Microphone capture started on {} ({}Hz mono, {} samples/frame)",
                    device_name, self.config.target_sample_rate, self.config.frame_size
                );
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                error!("Error accessing microphone: {}", e);
                join_worker(worker).await;
                Err(e)
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        info!("Stopping microphone capture");
        join_worker(worker).await;
        info!("Microphone released");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

async fn join_worker(worker: CaptureThread) {
    let handle = worker.shutdown();
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("Capture thread panicked"),
        Err(e) => error!("Failed to join capture thread: {}", e),
    }
}

fn run_capture(
    config: AudioBackendConfig,
    sink: Arc<dyn FrameSink>,
    ready_tx: oneshot::Sender<Result<String, CaptureError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match open_stream(&config, sink) {
        Ok((stream, name)) => {
            let _ = ready_tx.send(Ok(name));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Blocks until stop is requested or the sender is dropped
    let _ = stop_rx.recv();
    drop(stream);
}

fn open_stream(
    config: &AudioBackendConfig,
    sink: Arc<dyn FrameSink>,
) -> Result<(cpal::Stream, String), CaptureError> {
    let host = cpal::default_host();

    let device = match &config.device {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| CaptureError::DeviceAccess(e.to_string()))?
            .find(|device| device.name().map(|n| &n == wanted).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceAccess(format!("Input device not found: {}", wanted)))?,
        None => host.default_input_device().ok_or_else(|| {
            CaptureError::DeviceAccess("No input device available".to_string())
        })?,
    };

    let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());

    let supported = device.default_input_config().map_err(|e| {
        CaptureError::DeviceAccess(format!(
            "Could not access your microphone ({}). Please check permissions and try again.",
            e
        ))
    })?;
    let stream_config: cpal::StreamConfig = supported.config();

    info!(
        "Opening {} ({}Hz, {} channels, {:?})",
        device_name,
        stream_config.sample_rate.0,
        stream_config.channels,
        supported.sample_format()
    );

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, config, sink),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, config, sink),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, config, sink),
        other => {
            return Err(CaptureError::DeviceAccess(format!(
                "Unsupported sample format {:?}",
                other
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::DeviceAccess(e.to_string()))?;

    Ok((stream, device_name))
}

fn build_stream<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    config: &AudioBackendConfig,
    sink: Arc<dyn FrameSink>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut assembler = FrameAssembler::new(
        stream_config.channels,
        stream_config.sample_rate.0,
        config.target_sample_rate,
        config.frame_size,
    );

    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !sink.is_active() {
                    return;
                }
                let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample_(s)).collect();
                assembler.push(&samples, |frame| {
                    sink.push(frame);
                });
            },
            |err| error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| CaptureError::DeviceAccess(e.to_string()))
}
