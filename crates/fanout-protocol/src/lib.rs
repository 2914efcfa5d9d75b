//! fanout-protocol
//!
//! Wire-level encoding/decoding for the fan-out hub.
//!
//! This crate turns raw text into the logical types of `fanout-core`
//! and back again.
//!
//! - [`frame_codec`] : peer WebSocket text frames (room requests, notifications)
//! - [`rpc_codec`]   : line-delimited JSON notification RPC

pub mod wire_types;
pub mod frame_codec;
pub mod rpc_codec;

pub use frame_codec::{
    FrameError,
    Inbound,
    decode_inbound,
    encode_outbound,
    encode_subscription,
};

pub use rpc_codec::{
    RoutedMessage,
    RpcCall,
    RpcError,
    RpcReply,
    RpcRequest,
    decode_reply,
    decode_request,
    encode_reply,
    encode_request,
};
