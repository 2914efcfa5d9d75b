//! Admission extension points.
//!
//! Two hooks guard the two ways into the server:
//! - [`TokenValidator`] runs during the WebSocket handshake with the
//!   token taken from the query string, and may attach a user id.
//! - [`AuthHook`] runs before every notification RPC call.
//!
//! [`AllowAll`] implements both and lets everything through. It is the
//! default so the server is usable out of the box; deployments are
//! expected to plug in real verification.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,

    #[error("invalid credentials: {0}")]
    Invalid(String),
}

/// Decides whether a peer may open a connection.
pub trait TokenValidator: Send + Sync + 'static {
    /// `token` is the value of the configured query parameter, if present.
    /// `Ok(Some(user_id))` admits the peer under that identity,
    /// `Ok(None)` admits it anonymously.
    fn validate(&self, token: Option<&str>) -> Result<Option<String>, AuthError>;
}

/// What an RPC caller presented.
#[derive(Debug, Clone)]
pub struct CallContext<'a> {
    pub peer: Option<SocketAddr>,
    pub token: Option<&'a str>,
}

impl CallContext<'_> {
    /// Context for in-process callers.
    pub fn local() -> Self {
        CallContext {
            peer: None,
            token: None,
        }
    }
}

/// Decides whether a backend may push notifications.
pub trait AuthHook: Send + Sync + 'static {
    /// `method` is the RPC method name (`broadcast`, `notifyRoom`, `privateNotify`).
    fn authorize(&self, method: &'static str, ctx: &CallContext<'_>) -> Result<(), AuthError>;
}

/// Permissive default for both hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl TokenValidator for AllowAll {
    fn validate(&self, _token: Option<&str>) -> Result<Option<String>, AuthError> {
        Ok(None)
    }
}

impl AuthHook for AllowAll {
    fn authorize(&self, _method: &'static str, _ctx: &CallContext<'_>) -> Result<(), AuthError> {
        Ok(())
    }
}
