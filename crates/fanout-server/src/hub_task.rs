//! Central hub loop.
//!
//! This task owns the `Hub` registries and processes every
//! `HubCommand`, one at a time, from:
//! - connection reader tasks (unregister, room enter/leave),
//! - the acceptance endpoint (register),
//! - the notification façade (broadcast, private notify).
//!
//! Nothing outside this task ever touches the registries, so no locks
//! are needed. Delivery into connection mailboxes is non-blocking; slow
//! connections are evicted inside `Hub` rather than stalling the loop.

use fanout_core::{
    ConnectionId, Hub, HubError, HubStats, MessageWithRoom, MessageWithUser, Outbox, Subscription,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{HubClosed, HubCommand, HubRx, HubTx, HUB_MAILBOX};

/// Cloneable front door to the hub actor.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: HubTx,
}

impl HubHandle {
    pub fn new(tx: HubTx) -> Self {
        HubHandle { tx }
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), HubClosed> {
        self.tx.send(cmd).await.map_err(|_| HubClosed)
    }

    pub async fn register(
        &self,
        id: ConnectionId,
        user_id: Option<String>,
        outbox: Outbox,
    ) -> Result<(), HubClosed> {
        self.send(HubCommand::Register {
            id,
            user_id,
            outbox,
        })
        .await
    }

    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubClosed> {
        self.send(HubCommand::Unregister(id)).await
    }

    pub async fn subscribe(&self, room: impl Into<String>, id: ConnectionId) -> Result<(), HubClosed> {
        self.send(HubCommand::SubscribeRoom(Subscription::new(room, id)))
            .await
    }

    pub async fn unsubscribe(
        &self,
        room: impl Into<String>,
        id: ConnectionId,
    ) -> Result<(), HubClosed> {
        self.send(HubCommand::UnsubscribeRoom(Subscription::new(room, id)))
            .await
    }

    pub async fn broadcast(&self, msg: MessageWithRoom) -> Result<(), HubClosed> {
        self.send(HubCommand::Broadcast(msg)).await
    }

    pub async fn private_notify(&self, msg: MessageWithUser) -> Result<(), HubClosed> {
        self.send(HubCommand::PrivateNotify(msg)).await
    }

    pub async fn stats(&self) -> Result<HubStats, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats(reply)).await?;
        rx.await.map_err(|_| HubClosed)
    }

    pub async fn room_members(&self, room: impl Into<String>) -> Result<Vec<ConnectionId>, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::RoomMembers {
            room: room.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| HubClosed)
    }

    pub async fn lookup_user(
        &self,
        user_id: impl Into<String>,
    ) -> Result<Option<ConnectionId>, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::LookupUser {
            user_id: user_id.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| HubClosed)
    }

    /// Ask the hub to close. Already-closed hubs are fine.
    pub async fn shutdown(&self) {
        let _ = self.send(HubCommand::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the hub actor. It runs until `shutdown` is cancelled or a
/// `HubCommand::Shutdown` arrives.
pub fn spawn_hub(shutdown: CancellationToken) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(HUB_MAILBOX);
    let task = tokio::spawn(run_hub_loop(rx, shutdown));
    (HubHandle::new(tx), task)
}

/// Run the hub processing loop.
pub async fn run_hub_loop(mut rx: HubRx, shutdown: CancellationToken) {
    let mut hub = Hub::new();
    info!("hub running");

    loop {
        let cmd = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };

        if !apply(&mut hub, cmd) {
            break;
        }
    }

    // Closing: every outbox is dropped (writers see their queue close)
    // and producers observe `HubClosed` from now on.
    let stats = hub.stats();
    hub.clear();
    rx.close();
    info!(
        connections = stats.connections,
        rooms = stats.rooms,
        "hub closed"
    );
}

/// Apply one command. Returns `false` once the hub should stop.
fn apply(hub: &mut Hub, cmd: HubCommand) -> bool {
    match cmd {
        HubCommand::Register {
            id,
            user_id,
            outbox,
        } => {
            debug!(%id, user_id = user_id.as_deref().unwrap_or(""), "register");
            hub.register(id, user_id, outbox);
        }
        HubCommand::Unregister(id) => {
            if hub.unregister(id) {
                debug!(%id, "unregister");
            }
        }
        HubCommand::SubscribeRoom(sub) => {
            if hub.subscribe(&sub.room, sub.connection) {
                debug!(id = %sub.connection, room = %sub.room, "entered room");
            }
        }
        HubCommand::UnsubscribeRoom(sub) => {
            if hub.unsubscribe(&sub.room, sub.connection) {
                debug!(id = %sub.connection, room = %sub.room, "left room");
            }
        }
        HubCommand::Broadcast(msg) => {
            let outcome = hub.broadcast(&msg);
            report("broadcast", outcome);
        }
        HubCommand::PrivateNotify(msg) => {
            let outcome = hub.private_notify(&msg);
            report("private notify", outcome);
        }
        HubCommand::Stats(reply) => {
            let _ = reply.send(hub.stats());
        }
        HubCommand::RoomMembers { room, reply } => {
            let _ = reply.send(hub.room_members(&room));
        }
        HubCommand::LookupUser { user_id, reply } => {
            let _ = reply.send(hub.lookup_user(&user_id));
        }
        HubCommand::Shutdown => return false,
    }
    true
}

fn report(kind: &'static str, outcome: Result<fanout_core::Delivery, HubError>) {
    match outcome {
        Ok(delivery) => {
            debug!(
                kind,
                delivered = delivery.delivered,
                evicted = delivery.evicted.len(),
                "delivered"
            );
        }
        Err(HubError::Encode(e)) => warn!(kind, error = %e, "dropping undeliverable message"),
        Err(e) => info!(kind, reason = %e, "nothing to deliver"),
    }
}
