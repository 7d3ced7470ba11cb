//! Wire protocol for the relay.
//!
//! All frames are JSON text. Two envelope shapes exist side by side:
//!
//! - The generic envelope `{event, data}` used for relayed events, room
//!   joins, room stats, and errors. Addressing lives inside `data.room`
//!   (a string or a list of strings).
//! - The bridge envelope `{pluginMessage, pluginId}` consumed by the plugin
//!   sandbox, which only accepts messages in the host's `postMessage` shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known event names on the generic envelope.
pub mod events {
    /// Client asks to join an additional room: `{event: "join", data: {room}}`.
    pub const JOIN: &str = "join";
    /// Server pushes the room membership table to every socket.
    pub const ROOM_STATS: &str = "room_stats";
    /// Server-side error report, e.g. a rejected handshake.
    pub const ERROR: &str = "error";
}

/// Generic relay envelope: `{event: string, data: {room?, ...payload}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, free-form for relayed traffic.
    pub event: String,
    /// Payload. `None` and JSON `null` are treated as a logged no-op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Build an envelope from an event name and payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data: Some(data),
        }
    }

    /// The room stats broadcast: `{event: "room_stats", data: {rooms: {...}}}`.
    ///
    /// A `BTreeMap` keeps the serialized table deterministic.
    pub fn room_stats(rooms: BTreeMap<String, usize>) -> Self {
        Self::new(events::ROOM_STATS, serde_json::json!({ "rooms": rooms }))
    }

    /// An error report sent before closing a rejected connection.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(events::ERROR, serde_json::json!({ "message": message.into() }))
    }

    /// Serialize to a wire frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    /// Extract `data.room` for a `join` frame. Only a plain string is a
    /// valid join target.
    pub fn join_room(&self) -> Option<&str> {
        self.data.as_ref()?.get("room")?.as_str()
    }
}

/// Result of reading the `room` field off an inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomField {
    /// No `room` key (or an explicit `null`): broadcast to everyone.
    Absent,
    /// One or more target rooms.
    Rooms(Vec<String>),
}

/// Parse `data.room`, which may be a string or a list of strings.
///
/// Anything else (a number, an object, a list with non-string entries) is a
/// malformed frame and yields `None`; the caller logs and drops the message.
pub fn room_field(data: &Value) -> Option<RoomField> {
    match data.get("room") {
        None | Some(Value::Null) => Some(RoomField::Absent),
        Some(Value::String(room)) => Some(RoomField::Rooms(vec![room.clone()])),
        Some(Value::Array(entries)) => {
            let rooms: Option<Vec<String>> = entries
                .iter()
                .map(|entry| entry.as_str().map(str::to_owned))
                .collect();
            rooms.map(RoomField::Rooms)
        }
        Some(_) => None,
    }
}

/// A connected peer as seen by other peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Generated unique id for this connection.
    pub id: String,
    /// Free-form tag presented at handshake ("unknown" when unspecified).
    pub source: String,
}

/// Peer lifecycle events delivered through the bridge envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Full list of other connected peers, sent to a newly joined socket.
    ClientList,
    /// Another peer appeared.
    ClientConnected,
    /// A peer went away.
    ClientDisconnected,
}

/// Inner payload of the bridge envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMessage {
    pub event: BridgeEvent,
    /// Human-readable description, mirrored from the host tooling.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<ClientInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
    /// Source tag of the peer the event is about.
    pub source: String,
}

/// Bridge-shaped frame: `{pluginMessage: {...}, pluginId: "*"}`.
///
/// The wildcard `pluginId` lets the sandbox accept the message regardless of
/// which plugin is being developed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEnvelope {
    pub plugin_message: PluginMessage,
    pub plugin_id: String,
}

impl BridgeEnvelope {
    fn wrap(plugin_message: PluginMessage) -> Self {
        Self {
            plugin_message,
            plugin_id: String::from("*"),
        }
    }

    /// Frame telling a new peer who else is connected.
    pub fn client_list(clients: Vec<ClientInfo>, source: impl Into<String>) -> Self {
        Self::wrap(PluginMessage {
            event: BridgeEvent::ClientList,
            message: String::from("List of connected clients"),
            clients: Some(clients),
            client: None,
            source: source.into(),
        })
    }

    /// Frame announcing a new peer to everyone else.
    pub fn client_connected(client: ClientInfo) -> Self {
        let source = client.source.clone();
        Self::wrap(PluginMessage {
            event: BridgeEvent::ClientConnected,
            message: String::from("Client connected"),
            clients: None,
            client: Some(client),
            source,
        })
    }

    /// Frame announcing that a peer disconnected.
    pub fn client_disconnected(client: ClientInfo) -> Self {
        let source = client.source.clone();
        Self::wrap(PluginMessage {
            event: BridgeEvent::ClientDisconnected,
            message: String::from("Client disconnected"),
            clients: None,
            client: Some(client),
            source,
        })
    }

    /// Serialize to a wire frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
