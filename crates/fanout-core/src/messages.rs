//! Message types used by the fan-out hub.
//!
//! These are the **logical** shapes:
//! - [`Message`]: the notification a peer finally receives.
//! - [`MessageWithRoom`] / [`MessageWithUser`]: a `Message` plus its
//!   routing target, as handed to the hub.
//! - [`IncomingSubscription`]: a validated room enter/leave request
//!   coming from a peer.
//!
//! Routing fields never leave the process: only the base [`Message`]
//! is serialized towards peers (see [`Message::encode`]).
//!
//! Parsing raw peer frames lives in the `fanout-protocol` crate.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Serialized outbound frame, shared by every recipient of one delivery.
pub type Payload = Arc<str>;

/// Identifier for a live connection.
///
/// This is intentionally opaque; we just guarantee uniqueness
/// over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Error,
    Info,
}

/// Notification as seen by a peer.
///
/// Wire form: `{"type":"info","entityId":"...","message":<any>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,

    #[serde(rename = "entityId")]
    pub entity_id: String,

    /// Opaque body; forwarded untouched.
    #[serde(rename = "message", default)]
    pub body: serde_json::Value,
}

impl Message {
    pub fn new(
        kind: MessageType,
        entity_id: impl Into<String>,
        body: impl Into<serde_json::Value>,
    ) -> Self {
        Message {
            kind,
            entity_id: entity_id.into(),
            body: body.into(),
        }
    }

    /// Convenience constructor for an `info` notification.
    pub fn info(entity_id: impl Into<String>, body: impl Into<serde_json::Value>) -> Self {
        Message::new(MessageType::Info, entity_id, body)
    }

    /// Convenience constructor for an `error` notification.
    pub fn error(entity_id: impl Into<String>, body: impl Into<serde_json::Value>) -> Self {
        Message::new(MessageType::Error, entity_id, body)
    }

    /// Serialize into the shared outbound payload.
    pub fn encode(&self) -> Result<Payload, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Payload::from(json))
    }
}

/// A message addressed to one room, or to every connection when
/// `room` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageWithRoom {
    pub message: Message,
    pub room: Option<String>,
}

impl MessageWithRoom {
    /// Message for every registered connection.
    pub fn everyone(message: Message) -> Self {
        MessageWithRoom {
            message,
            room: None,
        }
    }

    /// Message for the members of `room`.
    pub fn room_message(
        kind: MessageType,
        entity_id: impl Into<String>,
        room: impl Into<String>,
        body: impl Into<serde_json::Value>,
    ) -> Self {
        MessageWithRoom {
            message: Message::new(kind, entity_id, body),
            room: Some(room.into()),
        }
    }
}

/// A message addressed to the connection indexed under `user_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageWithUser {
    pub message: Message,
    pub user_id: String,
}

impl MessageWithUser {
    pub fn new(message: Message, user_id: impl Into<String>) -> Self {
        MessageWithUser {
            message,
            user_id: user_id.into(),
        }
    }
}

/// Room subscription action requested by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Enter,
    Leave,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Enter => "enter",
            Action::Leave => "leave",
        }
    }
}

impl std::str::FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enter" => Ok(Action::Enter),
            "leave" => Ok(Action::Leave),
            _ => Err(()),
        }
    }
}

/// Validated room request from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingSubscription {
    pub action: Action,
    pub room: String,
}

/// Room membership change for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub room: String,
    pub connection: ConnectionId,
}

impl Subscription {
    pub fn new(room: impl Into<String>, connection: ConnectionId) -> Self {
        Subscription {
            room: room.into(),
            connection,
        }
    }
}
