use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::audio::{AudioFrame, FrameSink};
use crate::transport::{OutboundEvent, Transport};

/// Frames captured during the current attempt, shared with the session
#[derive(Clone, Default)]
pub struct CapturedFrames {
    frames: Arc<Mutex<Vec<AudioFrame>>>,
}

impl CapturedFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    /// Copy of every frame so far
    pub fn snapshot(&self) -> Vec<AudioFrame> {
        self.frames.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AudioFrame>> {
        self.frames.lock()
    }
}

/// Per-frame callback handed to the audio backend
///
/// The active flag is read under the frame lock, so once
/// [`FrameTap::deactivate`] returns no frame can be stored or sent.
pub struct FrameTap {
    active: Arc<AtomicBool>,
    frames: CapturedFrames,
    transport: Arc<dyn Transport>,
    sample_rate: u32,
}

impl FrameTap {
    pub fn new(
        active: Arc<AtomicBool>,
        frames: CapturedFrames,
        transport: Arc<dyn Transport>,
        sample_rate: u32,
    ) -> Self {
        Self {
            active,
            frames,
            transport,
            sample_rate,
        }
    }

    /// Clear the flag and wait out any frame mid-delivery
    pub fn deactivate(active: &AtomicBool, frames: &CapturedFrames) {
        active.store(false, Ordering::SeqCst);
        drop(frames.lock());
    }
}

impl FrameSink for FrameTap {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn push(&self, samples: &[f32]) -> bool {
        let mut frames = self.frames.lock();
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }

        let frame = AudioFrame::from_samples(samples, self.sample_rate, frames.len() as u64);

        if frame.sequence < 5 {
            debug!(
                "Sending audio chunk {} (length={}, first samples={:?})",
                frame.sequence,
                frame.samples.len(),
                &frame.samples[..frame.samples.len().min(5)]
            );
        }

        self.transport
            .send(OutboundEvent::AudioData(frame.samples.clone()));
        frames.push(frame);
        true
    }
}
