//! Low-level wire constants.
//!
//! Shared by the codecs in this crate and by the server, so that both
//! ends of every limit agree.

/// Text payload a peer sends to keep its connection warm; discarded.
pub const KEEPALIVE: &str = "0";

/// Request path of the connection endpoint.
pub const WS_PATH: &str = "/ws";

/// Largest inbound peer message accepted, in bytes.
pub const MAX_FRAME_SIZE: usize = 512;

/// Largest notification RPC request line, in bytes.
pub const MAX_RPC_LINE: usize = 64 * 1024;

/// RPC method names.
pub const METHOD_BROADCAST: &str = "broadcast";
pub const METHOD_NOTIFY_ROOM: &str = "notifyRoom";
pub const METHOD_PRIVATE_NOTIFY: &str = "privateNotify";
