use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one recording attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Recording,
    /// Waiting for `transcription-result`
    Processing,
    Complete,
    Error,
}

impl Phase {
    /// States `start` may leave from
    pub fn can_start(self) -> bool {
        matches!(self, Phase::Idle | Phase::Error)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

/// Transcription returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub svg: String,
}

/// Mutable state of the session, published through a watch channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,

    /// Whole seconds spent recording; never above the cap
    pub elapsed_secs: u32,

    /// Set once recording has ended (manual stop or cap), until reset
    pub recording_complete: bool,

    pub result: Option<TranscriptionResult>,

    pub last_error: Option<String>,

    /// Identifies the current attempt
    pub attempt_id: Option<Uuid>,

    /// When the current attempt started recording
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// What callers observe about the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub elapsed_secs: u32,
    pub max_recording_secs: u32,
    pub recording_complete: bool,
    pub is_recording: bool,
    pub is_processing: bool,
    pub result: Option<TranscriptionResult>,
    pub last_error: Option<String>,
    pub configured: bool,
    pub frames_captured: usize,
    pub attempt_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn new(
        state: &SessionState,
        configured: bool,
        frames_captured: usize,
        max_recording_secs: u32,
    ) -> Self {
        Self {
            phase: state.phase,
            elapsed_secs: state.elapsed_secs,
            max_recording_secs,
            recording_complete: state.recording_complete,
            is_recording: state.phase == Phase::Recording,
            is_processing: state.phase == Phase::Processing,
            result: state.result.clone(),
            last_error: state.last_error.clone(),
            configured,
            frames_captured,
            attempt_id: state.attempt_id,
            started_at: state.started_at,
        }
    }
}
