//! Notification façade.
//!
//! Backend services push notifications through [`Notifier`]; each call
//! passes the [`AuthHook`] and is then turned into exactly one hub
//! command. Calls are fire-and-forget: success means the hub accepted
//! the command, not that any peer received it.

use std::sync::Arc;

use fanout_core::{Message, MessageWithRoom, MessageWithUser};
use fanout_protocol::wire_types::{METHOD_BROADCAST, METHOD_NOTIFY_ROOM, METHOD_PRIVATE_NOTIFY};
use fanout_protocol::RoutedMessage;
use thiserror::Error;

use crate::auth::{AuthError, AuthHook, CallContext};
use crate::hub_task::HubHandle;
use crate::types::HubClosed;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    #[error(transparent)]
    HubClosed(#[from] HubClosed),
}

#[derive(Clone)]
pub struct Notifier {
    hub: HubHandle,
    auth: Arc<dyn AuthHook>,
}

impl Notifier {
    pub fn new(hub: HubHandle, auth: Arc<dyn AuthHook>) -> Self {
        Notifier { hub, auth }
    }

    /// Send `message` to every connected peer.
    pub async fn broadcast(&self, ctx: &CallContext<'_>, message: Message) -> Result<(), NotifyError> {
        self.authorize(ctx, METHOD_BROADCAST)?;
        self.hub.broadcast(MessageWithRoom::everyone(message)).await?;
        Ok(())
    }

    /// Send `message` to the members of `room`.
    pub async fn notify_room(
        &self,
        ctx: &CallContext<'_>,
        message: Message,
        room: impl Into<String>,
    ) -> Result<(), NotifyError> {
        self.authorize(ctx, METHOD_NOTIFY_ROOM)?;
        self.hub
            .broadcast(MessageWithRoom {
                message,
                room: Some(room.into()),
            })
            .await?;
        Ok(())
    }

    /// Send `message` to the peer connected as `user_id`.
    pub async fn private_notify(
        &self,
        ctx: &CallContext<'_>,
        message: Message,
        user_id: impl Into<String>,
    ) -> Result<(), NotifyError> {
        self.authorize(ctx, METHOD_PRIVATE_NOTIFY)?;
        self.hub
            .private_notify(MessageWithUser::new(message, user_id))
            .await?;
        Ok(())
    }

    /// Dispatch an already-decoded RPC call.
    pub async fn dispatch(&self, ctx: &CallContext<'_>, routed: RoutedMessage) -> Result<(), NotifyError> {
        match routed {
            RoutedMessage::Room(MessageWithRoom {
                message,
                room: None,
            }) => self.broadcast(ctx, message).await,
            RoutedMessage::Room(MessageWithRoom {
                message,
                room: Some(room),
            }) => self.notify_room(ctx, message, room).await,
            RoutedMessage::User(MessageWithUser { message, user_id }) => {
                self.private_notify(ctx, message, user_id).await
            }
        }
    }

    fn authorize(&self, ctx: &CallContext<'_>, method: &'static str) -> Result<(), AuthError> {
        self.auth.authorize(method, ctx)
    }
}
