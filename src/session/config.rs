use crate::audio::AudioBackendConfig;

/// Configuration for a recording session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hard cap on one recording; reaching it stops the recording
    /// Default: 30 seconds
    pub max_recording_secs: u32,

    /// Frame format handed to the audio backend (16kHz mono, 4096 samples)
    pub audio: AudioBackendConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_recording_secs: 30,
            audio: AudioBackendConfig::default(),
        }
    }
}
