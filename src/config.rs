use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::AudioBackendConfig;
use crate::session::SessionConfig;
use crate::transport::TransportConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub session: SessionSettings,
    pub transport: TransportSettings,
    pub settings: SettingsFileConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "handscribe".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5510,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per frame handed to the transport
    pub frame_size: usize,
    /// Input device name; the host default is used when unset
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let backend = AudioBackendConfig::default();
        Self {
            sample_rate: backend.target_sample_rate,
            frame_size: backend.frame_size,
            device: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_recording_secs: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_recording_secs: SessionConfig::default().max_recording_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub connect_timeout_secs: u64,
    pub ping_timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            ping_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SettingsFileConfig {
    /// Where the backend URL is persisted (supports `~`)
    pub path: String,
}

impl Default for SettingsFileConfig {
    fn default() -> Self {
        Self {
            path: "~/.config/handscribe/settings.json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file, overridden by `HANDSCRIBE__*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("HANDSCRIBE").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    pub fn settings_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.settings.path)
            .with_context(|| format!("Failed to expand settings path {}", self.settings.path))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.ping_timeout_secs)
    }

    pub fn audio_backend(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: 1,
            frame_size: self.audio.frame_size,
            device: self.audio.device.clone(),
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            max_recording_secs: self.session.max_recording_secs,
            audio: self.audio_backend(),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
        }
    }
}
