//! fanout-core
//!
//! Pure fan-out hub logic:
//! - messages (notification, routing and subscription types)
//! - hub registries (connections, user index, rooms)
//! - error types

pub mod error;
pub mod hub;
pub mod messages;

pub use messages::{
    Action,
    ConnectionId,
    IncomingSubscription,
    Message,
    MessageType,
    MessageWithRoom,
    MessageWithUser,
    Payload,
    Subscription,
};

pub use error::HubError;
pub use hub::{Delivery, Hub, HubStats, Outbox};
