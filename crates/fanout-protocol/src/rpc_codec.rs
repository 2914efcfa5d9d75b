//! Notification RPC codec.
//!
//! Backend services talk to the hub over a line-delimited JSON protocol:
//! one request object per line in, one reply object per line out.
//!
//! ```text
//! {"method":"broadcast","message":{...}}
//! {"method":"notifyRoom","message":{...},"room":"r1"}
//! {"method":"privateNotify","message":{...},"userId":"u1"}
//! ```
//!
//! Every request may carry an optional `"token"` which is handed to the
//! server's authentication hook untouched.
//!
//! Replies are `{"ok":true}` or `{"ok":false,"error":"..."}`.

use fanout_core::{Message, MessageWithRoom, MessageWithUser};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire_types::{METHOD_BROADCAST, METHOD_NOTIFY_ROOM, METHOD_PRIVATE_NOTIFY};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("malformed rpc request: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty {0}")]
    EmptyField(&'static str),
}

/// The three façade operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum RpcCall {
    Broadcast {
        message: Message,
    },
    NotifyRoom {
        message: Message,
        room: String,
    },
    PrivateNotify {
        message: Message,
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl RpcCall {
    pub fn method(&self) -> &'static str {
        match self {
            RpcCall::Broadcast { .. } => METHOD_BROADCAST,
            RpcCall::NotifyRoom { .. } => METHOD_NOTIFY_ROOM,
            RpcCall::PrivateNotify { .. } => METHOD_PRIVATE_NOTIFY,
        }
    }
}

impl From<RpcCall> for RoutedMessage {
    fn from(call: RpcCall) -> Self {
        match call {
            RpcCall::Broadcast { message } => RoutedMessage::Room(MessageWithRoom::everyone(message)),
            RpcCall::NotifyRoom { message, room } => RoutedMessage::Room(MessageWithRoom {
                message,
                room: Some(room),
            }),
            RpcCall::PrivateNotify { message, user_id } => {
                RoutedMessage::User(MessageWithUser::new(message, user_id))
            }
        }
    }
}

/// An RPC call reduced to what the hub understands.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedMessage {
    Room(MessageWithRoom),
    User(MessageWithUser),
}

/// One request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(flatten)]
    pub call: RpcCall,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// One reply line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcReply {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcReply {
    pub fn ok() -> Self {
        RpcReply {
            ok: true,
            error: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        RpcReply {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// Parse and validate a request line.
pub fn decode_request(line: &str) -> Result<RpcRequest, RpcError> {
    let req: RpcRequest = serde_json::from_str(line.trim())?;
    match &req.call {
        RpcCall::NotifyRoom { room, .. } if room.is_empty() => Err(RpcError::EmptyField("room")),
        RpcCall::PrivateNotify { user_id, .. } if user_id.is_empty() => {
            Err(RpcError::EmptyField("userId"))
        }
        _ => Ok(req),
    }
}

pub fn encode_request(req: &RpcRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(req)
}

pub fn decode_reply(line: &str) -> Result<RpcReply, serde_json::Error> {
    serde_json::from_str(line.trim())
}

pub fn encode_reply(reply: &RpcReply) -> String {
    // `RpcReply` is a bool plus an optional string; serializing it cannot fail.
    serde_json::to_string(reply).unwrap_or_else(|_| String::from(r#"{"ok":false}"#))
}
