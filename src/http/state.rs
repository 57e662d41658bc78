use crate::session::RecordingSession;
use crate::settings::SettingsStore;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single recording session this client drives
    pub session: RecordingSession,

    /// Backend endpoint settings (same store the session reads)
    pub settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(session: RecordingSession) -> Self {
        let settings = Arc::clone(session.settings());
        Self { session, settings }
    }
}
