use anyhow::{bail, Result};
use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::state::{Phase, SessionSnapshot, SessionState, TranscriptionResult};
use crate::audio::{self, BackendProvider};
use crate::capture::{CaptureEngine, CapturedFrames};
use crate::error::{
    SessionError, CONNECT_FAILED_MESSAGE, DEFAULT_PROCESSING_MESSAGE, LOST_CONNECTION_MESSAGE,
    SERVER_START_REJECTED_MESSAGE,
};
use crate::settings::SettingsStore;
use crate::transport::{
    ChannelId, OutboundEvent, ServerEvent, TranscriptionPayload, Transport, TransportEvent,
};

/// One recording-through-result attempt at a time, against the configured backend
///
/// Cheap to clone; all clones drive the same session. Must be created inside
/// a tokio runtime (it spawns its event listener).
#[derive(Clone)]
pub struct RecordingSession {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    settings: Arc<SettingsStore>,
    transport: Arc<dyn Transport>,
    backends: BackendProvider,

    state: watch::Sender<SessionState>,

    /// Held across device start/stop so those never interleave
    capture: Mutex<CaptureEngine>,
    frames: CapturedFrames,

    /// Set between a successful start and the first stop; gates the stop path
    recording: AtomicBool,

    /// Bumped by reset and abort; a start that sees it move has been cancelled
    epoch: AtomicU64,

    /// Channel opened for the current attempt
    channel: SyncMutex<Option<ChannelId>>,

    timer: SyncMutex<Option<JoinHandle<()>>>,
    listener: SyncMutex<Option<JoinHandle<()>>>,
}

enum Tick {
    Continue,
    CapReached,
    NotRecording,
}

impl RecordingSession {
    pub fn new(
        config: SessionConfig,
        settings: Arc<SettingsStore>,
        transport: Arc<dyn Transport>,
        backends: BackendProvider,
    ) -> Self {
        let capture = CaptureEngine::new(
            Arc::clone(&settings),
            Arc::clone(&transport),
            config.audio.clone(),
        );
        let frames = capture.frames();
        let (state, _) = watch::channel(SessionState::idle());
        let events = transport.subscribe();

        let inner = Arc::new(Inner {
            config,
            settings,
            transport,
            backends,
            state,
            capture: Mutex::new(capture),
            frames,
            recording: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            channel: SyncMutex::new(None),
            timer: SyncMutex::new(None),
            listener: SyncMutex::new(None),
        });

        let listener = tokio::spawn(listen(Arc::downgrade(&inner), events));
        *inner.listener.lock() = Some(listener);

        Self { inner }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.inner.settings
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.borrow().clone();
        SessionSnapshot::new(
            &state,
            self.inner.settings.is_configured(),
            self.inner.frames.len(),
            self.inner.config.max_recording_secs,
        )
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    /// Watch every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Resolves once the attempt reaches `Complete` or `Error`
    pub async fn wait_for_outcome(&self) -> SessionSnapshot {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| state.phase.is_finished()).await;
        self.snapshot()
    }

    /// Start a recording attempt.
    ///
    /// No-op while recording, processing or complete (reset first). Guard
    /// failures move the session to `Error` and are also returned.
    pub async fn start(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        let mut capture = inner.capture.lock().await;

        let phase = inner.phase();
        if !phase.can_start() {
            warn!("Ignoring start while {:?}", phase);
            return Ok(());
        }

        let Some(url) = inner.settings.url() else {
            return Err(inner.fail(SessionError::Configuration));
        };

        let attempt_id = Uuid::new_v4();
        let epoch = inner.epoch.load(Ordering::SeqCst);
        inner.state.send_modify(|state| {
            *state = SessionState {
                attempt_id: Some(attempt_id),
                ..SessionState::idle()
            };
        });

        *inner.channel.lock() = None;
        let channel = match inner.transport.open(&url).await {
            Ok(channel) => channel,
            Err(e) => {
                error!("Failed to initialize socket: {}", e);
                return Err(inner.fail(SessionError::Transport(
                    CONNECT_FAILED_MESSAGE.to_string(),
                )));
            }
        };
        *inner.channel.lock() = Some(channel);

        inner.recording.store(true, Ordering::SeqCst);
        if inner.cancelled_since(epoch) {
            inner.recording.store(false, Ordering::SeqCst);
            info!("Recording attempt {} cancelled while connecting", attempt_id);
            return Ok(());
        }

        info!("Starting recording attempt {} against {}", attempt_id, url);

        inner.state.send_modify(|state| {
            state.phase = Phase::Recording;
            state.started_at = Some(Utc::now());
        });
        inner.transport.send(OutboundEvent::StartRecording);

        let started = match (inner.backends)(&inner.config.audio) {
            Ok(backend) => capture.start(backend).await,
            Err(e) => Err(e),
        };

        if let Err(e) = started {
            inner.recording.store(false, Ordering::SeqCst);
            return Err(inner.fail(e.into()));
        }

        if inner.cancelled_since(epoch) {
            inner.recording.store(false, Ordering::SeqCst);
            capture.discard().await;
            info!("Recording attempt {} cancelled while acquiring the device", attempt_id);
            return Ok(());
        }
        inner.spawn_timer();
        drop(capture);

        info!(
            "Recording started successfully (max {}s)",
            inner.config.max_recording_secs
        );
        Ok(())
    }

    /// Stop recording and hand the capture to the server for transcription.
    ///
    /// With zero frames captured the session goes to `Error` and
    /// `stop-recording` is not sent.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.inner.finish_recording(false).await
    }

    /// Back to idle from any state, releasing the device
    pub async fn reset(&self) {
        self.inner.reset().await;
    }

    /// Reconcile the open channel with the configured endpoint.
    ///
    /// A changed or cleared endpoint fails any attempt in flight.
    pub async fn sync_endpoint(&self) {
        let inner = &self.inner;
        let wanted = inner.settings.url();
        let current = inner.transport.endpoint();

        if wanted == current && (wanted.is_none() || inner.transport.is_open()) {
            return;
        }

        if matches!(inner.phase(), Phase::Recording | Phase::Processing) {
            inner
                .abort_attempt(SessionError::Transport(
                    "Backend endpoint changed".to_string(),
                ))
                .await;
        }

        *inner.channel.lock() = None;
        match wanted {
            Some(url) => match inner.transport.open(&url).await {
                Ok(channel) => {
                    *inner.channel.lock() = Some(channel);
                }
                Err(e) => warn!("Could not connect to {}: {}", url, e),
            },
            None => inner.transport.close().await,
        }
    }

    /// Write the captured frames to a WAV file
    pub fn save_recording(&self, path: impl AsRef<Path>) -> Result<usize> {
        let frames = self.inner.frames.snapshot();
        if frames.is_empty() {
            bail!("No audio captured");
        }
        audio::write_wav(path, &frames)
    }

    /// Teardown: release the device, stop the timer and listener, close the channel
    pub async fn shutdown(&self) {
        self.inner.reset().await;
        self.inner.transport.close().await;
        *self.inner.channel.lock() = None;
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
        info!("Recording session shut down");
    }
}

impl Inner {
    fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    fn cancelled_since(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    fn fail(&self, error: SessionError) -> SessionError {
        error!("Recording session error ({}): {}", error.code(), error);
        let message = error.to_string();
        self.state.send_modify(|state| {
            state.phase = Phase::Error;
            state.last_error = Some(message);
        });
        error
    }

    fn spawn_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };

                match inner.tick() {
                    Tick::Continue => {}
                    Tick::CapReached => {
                        info!(
                            "Maximum recording time of {}s reached",
                            inner.config.max_recording_secs
                        );
                        let _ = inner.finish_recording(true).await;
                        break;
                    }
                    Tick::NotRecording => break,
                }
            }
        });

        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    fn tick(&self) -> Tick {
        let max = self.config.max_recording_secs;
        let mut outcome = Tick::NotRecording;

        self.state.send_if_modified(|state| {
            if state.phase != Phase::Recording {
                return false;
            }
            state.elapsed_secs = (state.elapsed_secs + 1).min(max);
            outcome = if state.elapsed_secs >= max {
                Tick::CapReached
            } else {
                Tick::Continue
            };
            true
        });

        outcome
    }

    /// The timer task calls this on itself, so it must not abort its own handle
    fn cancel_timer(&self, from_timer: bool) {
        if let Some(timer) = self.timer.lock().take() {
            if !from_timer {
                timer.abort();
            }
        }
    }

    /// Shared by manual stop and the timer cap
    async fn finish_recording(&self, from_timer: bool) -> Result<(), SessionError> {
        if !self.recording.swap(false, Ordering::SeqCst) {
            debug!("Stop requested while not recording");
            return Ok(());
        }

        self.cancel_timer(from_timer);
        self.state.send_modify(|state| state.recording_complete = true);

        let captured = {
            let mut capture = self.capture.lock().await;
            capture.stop().await
        };

        let frames = match captured {
            Ok(frames) => frames,
            Err(e) => return Err(self.fail(e.into())),
        };

        if !self.transport.is_open() {
            return Err(self.fail(SessionError::Transport(
                LOST_CONNECTION_MESSAGE.to_string(),
            )));
        }

        self.state.send_modify(|state| state.phase = Phase::Processing);
        self.transport.send(OutboundEvent::StopRecording);
        info!("Sent stop-recording signal to server after {} frames", frames);

        Ok(())
    }

    /// Fail the attempt in flight, discarding whatever was captured
    async fn abort_attempt(&self, error: SessionError) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.recording.store(false, Ordering::SeqCst);
        let mut capture = self.capture.lock().await;
        self.cancel_timer(false);
        capture.discard().await;
        self.fail(error);
    }

    async fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.recording.store(false, Ordering::SeqCst);
        let mut capture = self.capture.lock().await;
        self.cancel_timer(false);
        capture.discard().await;
        drop(capture);
        self.state.send_modify(|state| *state = SessionState::idle());
        info!("Recording session reset");
    }

    async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Server(ServerEvent::RecordingStarted(ack)) => {
                if ack.success {
                    debug!("Server acknowledged start-recording");
                } else if self.phase() == Phase::Recording {
                    self.abort_attempt(SessionError::ServerProcessing(
                        SERVER_START_REJECTED_MESSAGE.to_string(),
                    ))
                    .await;
                } else {
                    warn!("Server rejected a recording that is no longer active");
                }
            }
            TransportEvent::Server(ServerEvent::TranscriptionResult(payload)) => {
                self.apply_result(payload);
            }
            TransportEvent::Connected { channel, url } => {
                debug!("Channel {} connected to {}", channel, url);
            }
            TransportEvent::Disconnected { channel, reason }
            | TransportEvent::Error { channel, reason } => {
                self.connection_lost(channel, reason).await;
            }
        }
    }

    fn apply_result(&self, payload: TranscriptionPayload) {
        let mut applied = false;
        let mut failure = None;

        self.state.send_if_modified(|state| {
            if state.phase != Phase::Processing {
                return false;
            }
            applied = true;

            if payload.success {
                state.phase = Phase::Complete;
                state.last_error = None;
                state.result = Some(TranscriptionResult {
                    text: payload.text.clone().unwrap_or_default(),
                    svg: payload.svg.clone().unwrap_or_default(),
                });
            } else {
                let error = SessionError::ServerProcessing(
                    payload
                        .error
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PROCESSING_MESSAGE.to_string()),
                );
                state.phase = Phase::Error;
                state.last_error = Some(error.to_string());
                failure = Some(error);
            }
            true
        });

        match (applied, failure) {
            (false, _) => warn!("Ignoring transcription-result outside of processing"),
            (true, None) => info!("Transcription result received"),
            (true, Some(error)) => error!("Transcription failed: {}", error),
        }
    }

    async fn connection_lost(&self, channel: Option<ChannelId>, reason: String) {
        if let Some(lost) = channel {
            if *self.channel.lock() != Some(lost) {
                debug!("Ignoring event from stale channel {}: {}", lost, reason);
                return;
            }
        }

        let error = SessionError::Transport(format!("{}: {}", LOST_CONNECTION_MESSAGE, reason));

        match self.phase() {
            Phase::Recording => self.abort_attempt(error).await,
            Phase::Processing => {
                self.fail(error);
            }
            phase => debug!("Channel event while {:?}: {}", phase, reason),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

async fn listen(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(event).await;
    }
}
