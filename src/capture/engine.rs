use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::tap::{CapturedFrames, FrameTap};
use super::CaptureError;
use crate::audio::{AudioBackend, AudioBackendConfig};
use crate::settings::SettingsStore;
use crate::transport::Transport;

/// Owns the device for one recording attempt
pub struct CaptureEngine {
    settings: Arc<SettingsStore>,
    transport: Arc<dyn Transport>,
    config: AudioBackendConfig,
    active: Arc<AtomicBool>,
    frames: CapturedFrames,
    backend: Option<Box<dyn AudioBackend>>,
}

impl CaptureEngine {
    pub fn new(
        settings: Arc<SettingsStore>,
        transport: Arc<dyn Transport>,
        config: AudioBackendConfig,
    ) -> Self {
        Self {
            settings,
            transport,
            config,
            active: Arc::new(AtomicBool::new(false)),
            frames: CapturedFrames::new(),
            backend: None,
        }
    }

    /// Shared handle on the captured frames
    pub fn frames(&self) -> CapturedFrames {
        self.frames.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &AudioBackendConfig {
        &self.config
    }

    /// Acquire the device through `backend` and start forwarding frames.
    ///
    /// Fails before touching the device when no endpoint is configured. On
    /// any failure the backend is stopped again before returning.
    pub async fn start(&mut self, mut backend: Box<dyn AudioBackend>) -> Result<(), CaptureError> {
        if !self.settings.is_configured() {
            return Err(CaptureError::BackendNotConfigured);
        }

        if self.backend.is_some() {
            warn!("Capture already running; ignoring start");
            return Ok(());
        }

        self.frames.clear();
        self.active.store(true, Ordering::SeqCst);

        let tap = Arc::new(FrameTap::new(
            Arc::clone(&self.active),
            self.frames.clone(),
            Arc::clone(&self.transport),
            self.config.target_sample_rate,
        ));

        if let Err(e) = backend.start(tap).await {
            FrameTap::deactivate(&self.active, &self.frames);
            if let Err(stop_err) = backend.stop().await {
                warn!("Failed to release {} after start error: {}", backend.name(), stop_err);
            }
            return Err(e);
        }

        info!("Capture started via {}", backend.name());
        self.backend = Some(backend);
        Ok(())
    }

    /// Stop forwarding, release the device, and report the frame count.
    ///
    /// Zero frames is [`CaptureError::EmptyCapture`]; the device is released
    /// either way.
    pub async fn stop(&mut self) -> Result<usize, CaptureError> {
        FrameTap::deactivate(&self.active, &self.frames);
        self.release().await;

        let count = self.frames.len();
        info!("Stopping capture. Frames collected: {}", count);

        if count == 0 {
            return Err(CaptureError::EmptyCapture);
        }
        Ok(count)
    }

    /// Release the device and drop everything captured so far
    pub async fn discard(&mut self) {
        FrameTap::deactivate(&self.active, &self.frames);
        self.release().await;
        self.frames.clear();
    }

    async fn release(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.stop().await {
                warn!("Error releasing {}: {}", backend.name(), e);
            }
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        // Backends release their device in their own Drop
        self.active.store(false, Ordering::SeqCst);
    }
}
