//! Socket.IO (protocol 5) over Engine.IO (protocol 4) text packets.
//!
//! Only the websocket transport is spoken, so every websocket text frame is
//! exactly one Engine.IO packet. Socket.IO packets ride inside Engine.IO
//! `message` packets (type `4`):
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}   engine open
//! 2 / 3                           engine ping / pong
//! 40                              socket connect (default namespace)
//! 42["event",payload]             socket event
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::messages::OutboundEvent;

/// Query appended to the backend URL for the websocket upgrade
pub const ENGINE_IO_QUERY: &str = "EIO=4&transport=websocket";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("empty packet")]
    Empty,

    #[error("unknown engine.io packet type {0:?}")]
    UnknownEngineType(char),

    #[error("unknown socket.io packet type {0:?}")]
    UnknownSocketType(char),

    #[error("malformed event packet: {0}")]
    MalformedEvent(String),

    #[error("invalid packet json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine.IO open packet payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace connect; the server's reply carries `{"sid": ..}`
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    ConnectError(Value),
}

impl Packet {
    pub fn encode(&self) -> Result<String, CodecError> {
        let encoded = match self {
            Packet::Open(info) => format!("0{}", serde_json::to_string(info)?),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(data)) => format!("40{}", serde_json::to_string(data)?),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, args } => {
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                format!("42{}", serde_json::to_string(&array)?)
            }
            Packet::ConnectError(data) => format!("44{}", serde_json::to_string(data)?),
        };
        Ok(encoded)
    }

    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        let mut chars = raw.chars();
        let engine_type = chars.next().ok_or(CodecError::Empty)?;
        let rest = chars.as_str();

        match engine_type {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket_packet(rest),
            '5' | '6' => Ok(Packet::Noop),
            other => Err(CodecError::UnknownEngineType(other)),
        }
    }
}

fn decode_socket_packet(raw: &str) -> Result<Packet, CodecError> {
    let mut chars = raw.chars();
    let socket_type = chars.next().ok_or(CodecError::Empty)?;
    let body = strip_ack_id(strip_namespace(chars.as_str()));

    match socket_type {
        '0' => {
            if body.is_empty() {
                Ok(Packet::Connect(None))
            } else {
                Ok(Packet::Connect(Some(serde_json::from_str(body)?)))
            }
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let mut items: Vec<Value> = serde_json::from_str(body)?;
            if items.is_empty() {
                return Err(CodecError::MalformedEvent("missing event name".to_string()));
            }
            match items.remove(0) {
                Value::String(name) => Ok(Packet::Event { name, args: items }),
                other => Err(CodecError::MalformedEvent(format!(
                    "event name is not a string: {}",
                    other
                ))),
            }
        }
        '4' => {
            let data = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(body)?
            };
            Ok(Packet::ConnectError(data))
        }
        // Acks and binary packets are never requested by this client
        '3' | '5' | '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownSocketType(other)),
    }
}

/// Drop a `/namespace,` prefix; only the default namespace is used
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn strip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// Encode an outbound event as a Socket.IO event packet.
///
/// Samples are serialised straight from `f32` so the wire carries their
/// shortest representation.
pub fn encode_outbound(event: &OutboundEvent) -> Result<String, CodecError> {
    let json = match event {
        OutboundEvent::AudioData(samples) => serde_json::to_string(&(event.name(), samples))?,
        OutboundEvent::StartRecording | OutboundEvent::StopRecording => {
            serde_json::to_string(&[event.name()])?
        }
    };
    Ok(format!("42{}", json))
}

/// Map a backend URL (`http(s)://` or `ws(s)://`) to its Socket.IO websocket URL
pub fn socket_url(backend_url: &str) -> Option<String> {
    let trimmed = backend_url.trim().trim_end_matches('/');

    let (scheme, rest) = trimmed.split_once("://")?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return None,
    };

    if rest.is_empty() {
        return None;
    }

    Some(format!("{}://{}/socket.io/?{}", ws_scheme, rest, ENGINE_IO_QUERY))
}
