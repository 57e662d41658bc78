//! Recording session management
//!
//! This module provides the `RecordingSession` state machine that manages:
//! - Phase transitions (idle, recording, processing, complete, error)
//! - The one-second recording timer and its hard cap
//! - Driving the capture engine and the transport channel
//! - Turning server events into results and user-facing errors

mod config;
mod session;
mod state;

pub use config::SessionConfig;
pub use session::RecordingSession;
pub use state::{Phase, SessionSnapshot, SessionState, TranscriptionResult};
