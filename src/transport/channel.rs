use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::{OutboundEvent, TransportEvent};

/// Identity of one live connection; reopening the same URL keeps it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("connection to {0} timed out")]
    Timeout(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("server rejected the connection: {0}")]
    Rejected(String),

    #[error("connection closed during handshake")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on websocket connect plus Socket.IO handshake
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Duplex event channel to the backend
///
/// At most one live connection per transport, keyed by URL. Sends are
/// fire-and-forget; connection problems surface as
/// [`TransportEvent::Error`] to every subscriber.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Reuses the live channel for the same URL, replaces it for another
    async fn open(&self, url: &str) -> Result<ChannelId, TransportError>;

    /// No-op when nothing is open
    async fn close(&self);

    /// Enqueue an event; order of sends is preserved on the wire
    fn send(&self, event: OutboundEvent);

    /// Every subscriber sees every event, in subscription order
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent>;

    fn state(&self) -> ConnectionState;

    fn endpoint(&self) -> Option<String>;

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Fan-out list of event subscribers
#[derive(Clone, Default)]
pub struct Listeners {
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        rx
    }

    /// Deliver to all live subscribers; dropped receivers are pruned
    pub fn broadcast(&self, event: TransportEvent) {
        self.senders
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
