//! Socket.IO Packet Codec
//!
//! Text encoding of Engine.IO v4 packets and the Socket.IO v5 packets they
//! carry. Only what a WebSocket-transport client needs is covered: binary
//! attachments are rejected.
//!
//! ```text
//! engine:  <type>[payload]            e.g. "2" (ping), "0{...}" (open)
//! socket:  4<type>[/nsp,][id][json]   e.g. "42[\"newFeed\",{...}]"
//! ```

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Engine.IO protocol revision sent in the connect URL
pub const ENGINE_IO_VERSION: u8 = 4;

/// Default Socket.IO namespace
pub const DEFAULT_NAMESPACE: &str = "/";

/// Parameters announced by the server in the open packet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Transport-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Application-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

/// Codec errors
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown packet type: {0:?}")]
    UnknownType(char),

    #[error("Unsupported packet: {0}")]
    Unsupported(&'static str),

    #[error("Invalid packet payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid JSON in packet: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(PacketError::Unsupported("base64 binary message")),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    /// Client-side encoding. Open packets are server-only and encode as
    /// their bare type digit.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    /// Connect to the default namespace, optionally with auth data
    pub fn connect(auth: Option<Value>) -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: auth,
        }
    }

    pub fn disconnect() -> Self {
        SocketPacket::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Event on the default namespace with a single argument
    pub fn event(name: &str, arg: Value) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            id: None,
            name: name.to_string(),
            args: vec![arg],
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(PacketError::Unsupported("binary attachments"));
        }

        let namespace = if rest.starts_with('/') {
            let (ns, tail) = match rest.find(',') {
                Some(idx) => (&rest[..idx], &rest[idx + 1..]),
                None => (rest, ""),
            };
            rest = tail;
            ns.to_string()
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let id = if digits > 0 {
            let parsed = rest[..digits]
                .parse::<u64>()
                .map_err(|e| PacketError::InvalidPayload(e.to_string()))?;
            rest = &rest[digits..];
            Some(parsed)
        } else {
            None
        };

        let payload: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect {
                namespace,
                data: payload,
            }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = into_args(payload)?;
                if args.is_empty() {
                    return Err(PacketError::InvalidPayload("event without name".into()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(PacketError::InvalidPayload(format!(
                            "event name must be a string, got {}",
                            other
                        )))
                    }
                };
                Ok(SocketPacket::Event {
                    namespace,
                    id,
                    name,
                    args,
                })
            }
            '3' => Ok(SocketPacket::Ack {
                namespace,
                id: id.ok_or_else(|| PacketError::InvalidPayload("ack without id".into()))?,
                args: into_args(payload)?,
            }),
            '4' => Ok(SocketPacket::ConnectError {
                namespace,
                data: payload,
            }),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        let (kind, id, payload) = match self {
            SocketPacket::Connect { data, .. } => ('0', None, data.clone()),
            SocketPacket::Disconnect { .. } => ('1', None, None),
            SocketPacket::Event { id, name, args, .. } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                ('2', *id, Some(Value::Array(items)))
            }
            SocketPacket::Ack { id, args, .. } => ('3', Some(*id), Some(Value::Array(args.clone()))),
            SocketPacket::ConnectError { data, .. } => ('4', None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = id {
            out.push_str(&id.to_string());
        }
        if let Some(payload) = payload {
            out.push_str(&payload.to_string());
        }
        out
    }
}

fn into_args(payload: Option<Value>) -> Result<Vec<Value>, PacketError> {
    match payload {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(PacketError::InvalidPayload(format!(
            "expected array, got {}",
            other
        ))),
        None => Ok(Vec::new()),
    }
}
