//! Audio capture engine
//!
//! Bridges an [`AudioBackend`] to the transport:
//! - A synchronous active flag checked on every frame callback
//! - A local copy of every captured frame
//! - One `audio-data` emission per frame, in capture order
//! - Device release on stop, on failed start, and on drop

mod engine;
mod tap;

pub use engine::CaptureEngine;
pub use tap::{CapturedFrames, FrameTap};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("backend endpoint is not configured")]
    BackendNotConfigured,

    #[error("{0}")]
    DeviceAccess(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("no audio frames were captured")]
    EmptyCapture,
}
