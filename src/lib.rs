pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod settings;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    BackendProvider, FileBackend, FrameSink, MicrophoneBackend,
};
pub use capture::{CaptureEngine, CaptureError, CapturedFrames};
pub use config::Config;
pub use error::SessionError;
pub use http::{create_router, AppState};
pub use session::{
    Phase, RecordingSession, SessionConfig, SessionSnapshot, SessionState, TranscriptionResult,
};
pub use settings::{EndpointSettings, FileStore, KeyValueStore, MemoryStore, SettingsStore};
pub use transport::{
    ChannelId, ConnectionState, OutboundEvent, ServerEvent, SocketIoTransport, Transport,
    TransportConfig, TransportError, TransportEvent,
};
