use async_trait::async_trait;
use futures::stream::{SplitStream, StreamExt};
use futures::SinkExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::channel::{
    ChannelId, ConnectionState, Listeners, Transport, TransportConfig, TransportError,
};
use super::codec::{self, OpenInfo, Packet};
use super::messages::{OutboundEvent, ServerEvent, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Shared between the transport and its reader task, so a stale reader
/// never overwrites the state of a newer channel.
#[derive(Debug)]
struct ChannelStatus {
    current: Option<ChannelId>,
    state: ConnectionState,
}

struct LiveChannel {
    id: ChannelId,
    url: String,
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Socket.IO client over a single long-lived websocket
pub struct SocketIoTransport {
    config: TransportConfig,
    live: Mutex<Option<LiveChannel>>,
    /// Serialises open/close so two handshakes never race
    lifecycle: tokio::sync::Mutex<()>,
    status: Arc<Mutex<ChannelStatus>>,
    listeners: Listeners,
}

impl SocketIoTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            live: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            status: Arc::new(Mutex::new(ChannelStatus {
                current: None,
                state: ConnectionState::Disconnected,
            })),
            listeners: Listeners::new(),
        }
    }

    /// Id of the live channel, if any
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.live.lock().as_ref().map(|channel| channel.id)
    }

    fn set_state(&self, current: Option<ChannelId>, state: ConnectionState) {
        let mut status = self.status.lock();
        status.current = current;
        status.state = state;
    }

    /// Take the live channel out and stop it, returning its id
    fn teardown(&self) -> Option<ChannelId> {
        let channel = self.live.lock().take()?;
        let id = channel.id;

        info!("Closing channel {} to {}", channel.id, channel.url);

        channel.reader.abort();
        if let Ok(disconnect) = Packet::Disconnect.encode() {
            let _ = channel.outbound.send(disconnect);
        }
        // Dropping the last sender lets the writer flush, then close the socket
        drop(channel.outbound);
        drop(channel.writer);

        self.set_state(None, ConnectionState::Disconnected);
        Some(id)
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        if let Some(channel) = self.live.get_mut().take() {
            channel.reader.abort();
            channel.writer.abort();
        }
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    async fn open(&self, url: &str) -> Result<ChannelId, TransportError> {
        let _guard = self.lifecycle.lock().await;

        {
            let live = self.live.lock();
            if let Some(channel) = live.as_ref() {
                if channel.url == url && self.state() == ConnectionState::Connected {
                    debug!("Reusing channel {} to {}", channel.id, url);
                    return Ok(channel.id);
                }
            }
        }

        if let Some(old) = self.teardown() {
            self.listeners.broadcast(TransportEvent::Disconnected {
                channel: Some(old),
                reason: "channel replaced".to_string(),
            });
        }

        let ws_url =
            codec::socket_url(url).ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;

        self.set_state(None, ConnectionState::Connecting);
        info!("Connecting to socket server at {}", ws_url);

        let handshake = tokio::time::timeout(self.config.connect_timeout, handshake(&ws_url));
        let (ws, open_info) = match handshake.await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                error!("Socket connection error: {}", e);
                self.set_state(None, ConnectionState::Error);
                self.listeners.broadcast(TransportEvent::Error {
                    channel: None,
                    reason: e.to_string(),
                });
                return Err(e);
            }
            Err(_) => {
                let e = TransportError::Timeout(url.to_string());
                error!("Socket connection error: {}", e);
                self.set_state(None, ConnectionState::Error);
                self.listeners.broadcast(TransportEvent::Error {
                    channel: None,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let id = ChannelId::new();
        let (mut sink, stream) = ws.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = queue.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("Failed to write to socket: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("Socket writer stopped");
        });

        let reader = tokio::spawn(read_loop(
            stream,
            outbound.clone(),
            self.listeners.clone(),
            Arc::clone(&self.status),
            id,
        ));

        *self.live.lock() = Some(LiveChannel {
            id,
            url: url.to_string(),
            outbound,
            reader,
            writer,
        });
        self.set_state(Some(id), ConnectionState::Connected);

        info!(
            "Connected to socket server at {} (channel={}, sid={}, ping_interval={}ms)",
            url, id, open_info.sid, open_info.ping_interval
        );
        self.listeners.broadcast(TransportEvent::Connected {
            channel: id,
            url: url.to_string(),
        });

        Ok(id)
    }

    async fn close(&self) {
        let _guard = self.lifecycle.lock().await;

        if let Some(old) = self.teardown() {
            self.listeners.broadcast(TransportEvent::Disconnected {
                channel: Some(old),
                reason: "channel closed by client".to_string(),
            });
        }
    }

    fn send(&self, event: OutboundEvent) {
        let encoded = match codec::encode_outbound(&event) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode {} event: {}", event.name(), e);
                return;
            }
        };

        // A channel the server already dropped still has a writer until teardown
        let connected = self.state() == ConnectionState::Connected;
        let delivered = connected
            && match self.live.lock().as_ref() {
                Some(channel) => channel.outbound.send(encoded).is_ok(),
                None => false,
            };

        if !delivered {
            warn!("Dropping {} event: socket connection not established", event.name());
            self.listeners.broadcast(TransportEvent::Error {
                channel: None,
                reason: "Socket connection not established".to_string(),
            });
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.listeners.subscribe()
    }

    fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    fn endpoint(&self) -> Option<String> {
        self.live.lock().as_ref().map(|channel| channel.url.clone())
    }
}

/// Websocket connect, Engine.IO open, Socket.IO namespace connect
async fn handshake(ws_url: &str) -> Result<(WsStream, OpenInfo), TransportError> {
    let (mut ws, _response) =
        connect_async(ws_url)
            .await
            .map_err(|e| TransportError::Connect {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;

    let open_info = match next_packet(&mut ws).await? {
        Packet::Open(info) => info,
        other => {
            return Err(TransportError::Handshake(format!(
                "expected open packet, got {:?}",
                other
            )))
        }
    };

    send_packet(&mut ws, &Packet::Connect(None)).await?;

    loop {
        match next_packet(&mut ws).await? {
            Packet::Connect(_) => break,
            Packet::Ping => send_packet(&mut ws, &Packet::Pong).await?,
            Packet::ConnectError(data) => return Err(TransportError::Rejected(data.to_string())),
            Packet::Close | Packet::Disconnect => return Err(TransportError::Closed),
            other => debug!("Ignoring packet during handshake: {:?}", other),
        }
    }

    Ok((ws, open_info))
}

async fn send_packet(ws: &mut WsStream, packet: &Packet) -> Result<(), TransportError> {
    let text = packet
        .encode()
        .map_err(|e| TransportError::Handshake(e.to_string()))?;
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))
}

async fn next_packet(ws: &mut WsStream) -> Result<Packet, TransportError> {
    while let Some(message) = ws.next().await {
        match message.map_err(|e| TransportError::Handshake(e.to_string()))? {
            Message::Text(text) => {
                return Packet::decode(text.as_str())
                    .map_err(|e| TransportError::Handshake(e.to_string()));
            }
            Message::Close(_) => return Err(TransportError::Closed),
            _ => continue,
        }
    }
    Err(TransportError::Closed)
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    outbound: mpsc::UnboundedSender<String>,
    listeners: Listeners,
    status: Arc<Mutex<ChannelStatus>>,
    id: ChannelId,
) {
    let outcome = loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break Ok("connection closed".to_string()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => break Err(e.to_string()),
        };

        match Packet::decode(text.as_str()) {
            Ok(Packet::Ping) => {
                if let Ok(pong) = Packet::Pong.encode() {
                    let _ = outbound.send(pong);
                }
            }
            Ok(Packet::Event { name, args }) => match ServerEvent::from_event(&name, args) {
                Ok(Some(event)) => {
                    debug!("Received {} event", event.name());
                    listeners.broadcast(TransportEvent::Server(event));
                }
                Ok(None) => debug!("Ignoring unhandled event {}", name),
                Err(e) => warn!("Malformed {} payload: {}", name, e),
            },
            Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                break Ok("server closed the connection".to_string())
            }
            Ok(Packet::ConnectError(data)) => break Err(format!("server error: {}", data)),
            Ok(other) => debug!("Ignoring packet {:?}", other),
            Err(e) => warn!("Undecodable packet {:?}: {}", text.as_str(), e),
        }
    };

    let state = if outcome.is_ok() {
        ConnectionState::Disconnected
    } else {
        ConnectionState::Error
    };

    {
        let mut status = status.lock();
        if status.current == Some(id) {
            status.state = state;
        }
    }

    match outcome {
        Ok(reason) => {
            info!("Channel {} disconnected: {}", id, reason);
            listeners.broadcast(TransportEvent::Disconnected {
                channel: Some(id),
                reason,
            });
        }
        Err(reason) => {
            error!("Channel {} failed: {}", id, reason);
            listeners.broadcast(TransportEvent::Error {
                channel: Some(id),
                reason,
            });
        }
    }
}
