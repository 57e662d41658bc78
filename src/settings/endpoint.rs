use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use super::store::KeyValueStore;

/// Storage key for the backend URL
pub const BACKEND_URL_KEY: &str = "whisper_backend_url";

/// Current endpoint configuration; `configured` is always `url.is_some()`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    pub url: Option<String>,
    pub configured: bool,
}

impl EndpointSettings {
    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            configured: true,
        }
    }
}

/// Settings store for the backend endpoint
///
/// Starts empty; `load` reads the persisted value once, and every
/// `set_url`/`clear` is written through to storage immediately.
pub struct SettingsStore {
    storage: Box<dyn KeyValueStore>,
    current: RwLock<EndpointSettings>,
    client: reqwest::Client,
    ping_timeout: Duration,
}

impl SettingsStore {
    pub fn new(storage: Box<dyn KeyValueStore>, ping_timeout: Duration) -> Self {
        Self {
            storage,
            current: RwLock::new(EndpointSettings::unconfigured()),
            client: reqwest::Client::new(),
            ping_timeout,
        }
    }

    /// Read the persisted URL, if any. No network I/O.
    pub fn load(&self) -> Result<EndpointSettings> {
        let loaded = match self.storage.get(BACKEND_URL_KEY)? {
            Some(url) if !url.is_empty() => EndpointSettings::with_url(url),
            _ => EndpointSettings::unconfigured(),
        };

        match &loaded.url {
            Some(url) => info!("Loaded backend endpoint: {}", url),
            None => info!("No backend endpoint configured"),
        }

        *self.current.write() = loaded.clone();
        Ok(loaded)
    }

    /// Store and persist a URL. Format validation is the caller's job.
    pub fn set_url(&self, url: &str) -> Result<()> {
        self.storage.set(BACKEND_URL_KEY, url)?;
        *self.current.write() = EndpointSettings::with_url(url);

        info!("Backend endpoint set to {}", url);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(BACKEND_URL_KEY)?;
        *self.current.write() = EndpointSettings::unconfigured();

        info!("Backend endpoint cleared");
        Ok(())
    }

    pub fn settings(&self) -> EndpointSettings {
        self.current.read().clone()
    }

    pub fn url(&self) -> Option<String> {
        self.current.read().url.clone()
    }

    pub fn is_configured(&self) -> bool {
        self.current.read().configured
    }

    /// `GET <url>/ping` within the ping timeout.
    ///
    /// Any 2xx is reachable; everything else, including no URL configured,
    /// is reported as `false`.
    pub async fn check_liveness(&self) -> bool {
        let Some(url) = self.url() else {
            return false;
        };

        let ping_url = format!("{}/ping", url.trim_end_matches('/'));

        match self
            .client
            .get(&ping_url)
            .header("Content-Type", "application/json")
            .timeout(self.ping_timeout)
            .send()
            .await
        {
            Ok(response) => {
                let reachable = response.status().is_success();
                info!("Ping {} -> {}", ping_url, response.status());
                reachable
            }
            Err(e) => {
                warn!("Error connecting to backend at {}: {}", ping_url, e);
                false
            }
        }
    }
}
