//! Peer frame codec.
//!
//! Inbound text frames (peer → server) are either the keepalive literal
//! [`KEEPALIVE`] or a room request:
//!
//! ```text
//! {"action":"enter"|"leave","room":"<name>"}
//! ```
//!
//! Outbound frames (server → peer) are produced by
//! [`fanout_core::Message::encode`]; [`encode_outbound`] is a thin
//! wrapper kept here so both directions of the wire live side by side.

use fanout_core::{Action, IncomingSubscription, Message, Payload};
use serde::Deserialize;
use thiserror::Error;

use crate::wire_types::KEEPALIVE;

/// A decoded inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Peer-side liveness probe; nothing to do.
    KeepAlive,

    /// Validated room request.
    Subscription(IncomingSubscription),
}

/// Why an inbound frame was rejected. Never fatal for the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed subscription payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid subscription message body: empty action or room")]
    MissingField,

    #[error("invalid subscription action: {0:?}")]
    UnknownAction(String),
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    #[serde(default)]
    action: String,

    #[serde(default)]
    room: String,
}

/// Decode and validate one inbound text frame.
pub fn decode_inbound(text: &str) -> Result<Inbound, FrameError> {
    if text == KEEPALIVE {
        return Ok(Inbound::KeepAlive);
    }

    let raw: RawSubscription = serde_json::from_str(text)?;
    if raw.action.is_empty() || raw.room.is_empty() {
        return Err(FrameError::MissingField);
    }

    let action = raw
        .action
        .parse::<Action>()
        .map_err(|_| FrameError::UnknownAction(raw.action.clone()))?;

    Ok(Inbound::Subscription(IncomingSubscription {
        action,
        room: raw.room,
    }))
}

/// Serialize a notification exactly as a peer will receive it.
pub fn encode_outbound(msg: &Message) -> Result<Payload, serde_json::Error> {
    msg.encode()
}

/// Format a room request the way a peer would send it (clients, tests).
pub fn encode_subscription(sub: &IncomingSubscription) -> String {
    serde_json::json!({
        "action": sub.action.as_str(),
        "room": sub.room,
    })
    .to_string()
}
