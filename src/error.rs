//! Errors surfaced at the recording session boundary.
//!
//! Every failure inside the pipeline ends up as one of these variants; the
//! session stores its message as `last_error` so callers see one string.

use thiserror::Error;

use crate::capture::CaptureError;

pub const NOT_CONFIGURED_MESSAGE: &str =
    "Backend server not configured. Please go to Settings to configure the server.";
pub const CONNECT_FAILED_MESSAGE: &str =
    "Could not connect to the backend server. Check your settings.";
pub const EMPTY_CAPTURE_MESSAGE: &str = "No audio was recorded. Please try again.";
pub const DEFAULT_PROCESSING_MESSAGE: &str = "Error processing transcription";
pub const SERVER_START_REJECTED_MESSAGE: &str = "Failed to start recording on the server";
pub const LOST_CONNECTION_MESSAGE: &str = "Lost connection to server";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No endpoint configured; recording cannot start
    #[error("{}", NOT_CONFIGURED_MESSAGE)]
    Configuration,

    /// Permission denied or no capture device
    #[error("{0}")]
    DeviceAccess(String),

    /// Channel failed to open or dropped mid-session
    #[error("{0}")]
    Transport(String),

    /// Stop requested with zero captured frames
    #[error("{}", EMPTY_CAPTURE_MESSAGE)]
    EmptyCapture,

    /// Backend reported `success: false`
    #[error("{0}")]
    ServerProcessing(String),
}

impl SessionError {
    /// Stable machine-readable code for API consumers
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Configuration => "CONFIGURATION_ERROR",
            SessionError::DeviceAccess(_) => "DEVICE_ACCESS_ERROR",
            SessionError::Transport(_) => "TRANSPORT_ERROR",
            SessionError::EmptyCapture => "EMPTY_CAPTURE_ERROR",
            SessionError::ServerProcessing(_) => "SERVER_PROCESSING_ERROR",
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::BackendNotConfigured => SessionError::Configuration,
            CaptureError::EmptyCapture => SessionError::EmptyCapture,
            CaptureError::DeviceAccess(msg) | CaptureError::Stream(msg) => {
                SessionError::DeviceAccess(msg)
            }
        }
    }
}
