// Shared fakes for the integration tests
//
// FakeTransport records every open/send and lets a test inject server
// events; ManualBackend hands the frame sink to the test so frames are
// delivered exactly when the test fires them.

#![allow(dead_code)]

use async_trait::async_trait;
use handscribe::audio::{AudioBackend, AudioBackendConfig, BackendProvider, FrameSink};
use handscribe::capture::CaptureError;
use handscribe::session::{Phase, RecordingSession, SessionConfig, SessionSnapshot};
use handscribe::settings::{MemoryStore, SettingsStore, BACKEND_URL_KEY};
use handscribe::transport::{
    ChannelId, ConnectionState, Listeners, OutboundEvent, ServerEvent, Transport, TransportError,
    TransportEvent,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const BACKEND_URL: &str = "http://backend.test:5000";

// ============================================================================
// Transport
// ============================================================================

struct FakeState {
    sent: Vec<OutboundEvent>,
    opened: Vec<String>,
    endpoint: Option<String>,
    channel: Option<ChannelId>,
    state: ConnectionState,
    fail_open: bool,
    open_gate: Option<Arc<Notify>>,
}

pub struct FakeTransport {
    listeners: Listeners,
    inner: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Listeners::new(),
            inner: Mutex::new(FakeState {
                sent: Vec::new(),
                opened: Vec::new(),
                endpoint: None,
                channel: None,
                state: ConnectionState::Disconnected,
                fail_open: false,
                open_gate: None,
            }),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        let transport = Self::new();
        transport.inner.lock().fail_open = true;
        transport
    }

    /// Park every `open` until the returned gate is notified
    pub fn hold_open(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner.lock().open_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn sent(&self) -> Vec<OutboundEvent> {
        self.inner.lock().sent.clone()
    }

    pub fn sent_names(&self) -> Vec<&'static str> {
        self.inner.lock().sent.iter().map(|e| e.name()).collect()
    }

    pub fn count(&self, event: &OutboundEvent) -> usize {
        self.inner.lock().sent.iter().filter(|e| *e == event).count()
    }

    pub fn audio_frames(&self) -> usize {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|e| matches!(e, OutboundEvent::AudioData(_)))
            .count()
    }

    pub fn opened(&self) -> Vec<String> {
        self.inner.lock().opened.clone()
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.inner.lock().channel
    }

    pub fn inject(&self, event: ServerEvent) {
        self.listeners.broadcast(TransportEvent::Server(event));
    }

    pub fn emit(&self, event: TransportEvent) {
        self.listeners.broadcast(event);
    }

    /// Simulate the live connection failing underneath the session
    pub fn drop_connection(&self, reason: &str) {
        let channel = {
            let mut inner = self.inner.lock();
            inner.state = ConnectionState::Error;
            inner.channel
        };
        self.listeners.broadcast(TransportEvent::Error {
            channel,
            reason: reason.to_string(),
        });
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, url: &str) -> Result<ChannelId, TransportError> {
        let gate = self.inner.lock().open_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let (id, replaced) = {
            let mut inner = self.inner.lock();
            inner.opened.push(url.to_string());

            if inner.fail_open {
                inner.state = ConnectionState::Error;
                return Err(TransportError::Connect {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                });
            }

            if inner.endpoint.as_deref() == Some(url) && inner.state == ConnectionState::Connected
            {
                if let Some(id) = inner.channel {
                    return Ok(id);
                }
            }

            let id = ChannelId::new();
            let replaced = inner.channel.replace(id);
            inner.endpoint = Some(url.to_string());
            inner.state = ConnectionState::Connected;
            (id, replaced)
        };

        if let Some(old) = replaced {
            self.listeners.broadcast(TransportEvent::Disconnected {
                channel: Some(old),
                reason: "channel replaced".to_string(),
            });
        }
        self.listeners.broadcast(TransportEvent::Connected {
            channel: id,
            url: url.to_string(),
        });
        Ok(id)
    }

    async fn close(&self) {
        let closed = {
            let mut inner = self.inner.lock();
            inner.endpoint = None;
            inner.state = ConnectionState::Disconnected;
            inner.channel.take()
        };
        if let Some(old) = closed {
            self.listeners.broadcast(TransportEvent::Disconnected {
                channel: Some(old),
                reason: "channel closed by client".to_string(),
            });
        }
    }

    fn send(&self, event: OutboundEvent) {
        let delivered = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Connected {
                inner.sent.push(event);
                true
            } else {
                false
            }
        };
        if !delivered {
            self.listeners.broadcast(TransportEvent::Error {
                channel: None,
                reason: "Socket connection not established".to_string(),
            });
        }
    }

    fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<TransportEvent> {
        self.listeners.subscribe()
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    fn endpoint(&self) -> Option<String> {
        self.inner.lock().endpoint.clone()
    }
}

// ============================================================================
// Audio backends
// ============================================================================

/// Test-side handle on every backend built by its provider
#[derive(Clone, Default)]
pub struct ManualHandle {
    sink: Arc<Mutex<Option<Arc<dyn FrameSink>>>>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl ManualHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self) -> BackendProvider {
        let handle = self.clone();
        Arc::new(move |_config: &AudioBackendConfig| {
            Ok(Box::new(ManualBackend {
                handle: handle.clone(),
            }) as Box<dyn AudioBackend>)
        })
    }

    /// Push `count` frames; returns how many the sink accepted
    pub fn fire(&self, count: usize) -> usize {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => (0..count)
                .filter(|i| sink.push(&test_frame(*i as f32 * 0.01)))
                .count(),
            None => 0,
        }
    }

    /// Push straight into the last sink, even after the backend stopped
    pub fn fire_stale(&self, sink: &Arc<dyn FrameSink>, count: usize) -> usize {
        (0..count).filter(|_| sink.push(&test_frame(0.5))).count()
    }

    pub fn sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.sink.lock().clone()
    }

    pub fn is_released(&self) -> bool {
        self.sink.lock().is_none()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

pub struct ManualBackend {
    handle: ManualHandle,
}

impl ManualBackend {
    pub fn boxed(handle: &ManualHandle) -> Box<dyn AudioBackend> {
        Box::new(Self {
            handle: handle.clone(),
        })
    }
}

#[async_trait]
impl AudioBackend for ManualBackend {
    async fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), CaptureError> {
        self.handle.starts.fetch_add(1, Ordering::SeqCst);
        *self.handle.sink.lock() = Some(sink);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.handle.stops.fetch_add(1, Ordering::SeqCst);
        self.handle.sink.lock().take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.handle.sink.lock().is_some()
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Behaves like a microphone the user refused access to
pub struct FailingBackend;

impl FailingBackend {
    pub fn provider() -> BackendProvider {
        Arc::new(|_config: &AudioBackendConfig| Ok(Box::new(FailingBackend) as Box<dyn AudioBackend>))
    }
}

#[async_trait]
impl AudioBackend for FailingBackend {
    async fn start(&mut self, _sink: Arc<dyn FrameSink>) -> Result<(), CaptureError> {
        Err(CaptureError::DeviceAccess("Permission denied".to_string()))
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn test_frame(value: f32) -> Vec<f32> {
    vec![value; 4096]
}

// ============================================================================
// Session helpers
// ============================================================================

pub fn configured_settings(url: &str) -> Arc<SettingsStore> {
    let store = SettingsStore::new(
        Box::new(MemoryStore::with_entry(BACKEND_URL_KEY, url)),
        Duration::from_secs(1),
    );
    store.load().unwrap();
    Arc::new(store)
}

pub fn unconfigured_settings() -> Arc<SettingsStore> {
    Arc::new(SettingsStore::new(
        Box::new(MemoryStore::new()),
        Duration::from_secs(1),
    ))
}

pub fn session_config(max_recording_secs: u32) -> SessionConfig {
    SessionConfig {
        max_recording_secs,
        ..SessionConfig::default()
    }
}

pub fn new_session(
    settings: Arc<SettingsStore>,
    transport: &Arc<FakeTransport>,
    backends: BackendProvider,
) -> RecordingSession {
    RecordingSession::new(
        session_config(30),
        settings,
        Arc::clone(transport) as Arc<dyn Transport>,
        backends,
    )
}

/// Wait until the session reaches `phase` or fail the test
pub async fn wait_for_phase(session: &RecordingSession, phase: Phase) -> SessionSnapshot {
    let mut rx = session.subscribe();
    let reached = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.phase == phase))
        .await
        .is_ok();
    let snapshot = session.snapshot();
    assert!(
        reached,
        "session never reached {:?}; stuck at {:?}",
        phase, snapshot.phase
    );
    snapshot
}

/// Let the session's event listener drain what was injected
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
