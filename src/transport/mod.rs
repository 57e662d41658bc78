pub mod channel;
pub mod client;
pub mod codec;
pub mod messages;

pub use channel::{
    ChannelId, ConnectionState, Listeners, Transport, TransportConfig, TransportError,
};
pub use client::SocketIoTransport;
pub use codec::Packet;
pub use messages::{
    OutboundEvent, RecordingStarted, ServerEvent, TranscriptionPayload, TransportEvent,
};
