//! Error types for the hub registries.
//!
//! None of these are fatal: the hub actor logs them and moves on to
//! the next command. They exist so callers (and tests) can tell *why*
//! a delivery did not happen.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// The notification could not be serialized; nothing was sent.
    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// Room-targeted delivery to a room nobody is in.
    #[error("room not found or empty: {0}")]
    UnknownRoom(String),

    /// Private delivery to a user id with no indexed connection.
    #[error("no connection for user: {0}")]
    UnknownUser(String),
}
