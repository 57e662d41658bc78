use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::channel::ChannelId;

pub const START_RECORDING: &str = "start-recording";
pub const AUDIO_DATA: &str = "audio-data";
pub const STOP_RECORDING: &str = "stop-recording";
pub const RECORDING_STARTED: &str = "recording-started";
pub const TRANSCRIPTION_RESULT: &str = "transcription-result";

/// Events the client emits to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Open a new server-side recording session
    StartRecording,
    /// One captured frame, sent as a flat array of samples
    AudioData(Vec<f32>),
    /// Recording finished; server should transcribe
    StopRecording,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::StartRecording => START_RECORDING,
            OutboundEvent::AudioData(_) => AUDIO_DATA,
            OutboundEvent::StopRecording => STOP_RECORDING,
        }
    }
}

/// `recording-started` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStarted {
    pub success: bool,
}

/// `transcription-result` payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionPayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Events pushed by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    RecordingStarted(RecordingStarted),
    TranscriptionResult(TranscriptionPayload),
}

impl ServerEvent {
    /// Decode a named server event. Unknown names yield `Ok(None)`.
    pub fn from_event(name: &str, args: Vec<Value>) -> Result<Option<Self>, serde_json::Error> {
        let payload = args.into_iter().next().unwrap_or(Value::Null);

        let event = match name {
            RECORDING_STARTED => ServerEvent::RecordingStarted(serde_json::from_value(payload)?),
            TRANSCRIPTION_RESULT => {
                ServerEvent::TranscriptionResult(serde_json::from_value(payload)?)
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RecordingStarted(_) => RECORDING_STARTED,
            ServerEvent::TranscriptionResult(_) => TRANSCRIPTION_RESULT,
        }
    }
}

/// Everything a transport listener can observe
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed
    Connected { channel: ChannelId, url: String },
    /// A recognised server event
    Server(ServerEvent),
    /// Channel closed, by either side
    Disconnected {
        channel: Option<ChannelId>,
        reason: String,
    },
    /// Connection failed or dropped; `channel` is `None` when no channel
    /// was live (failed open, send without a connection)
    Error {
        channel: Option<ChannelId>,
        reason: String,
    },
}
