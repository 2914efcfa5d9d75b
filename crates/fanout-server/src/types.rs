//! Shared types for the hub server.
//!
//! This module defines:
//! - `HubCommand`: everything that flows into the hub actor
//! - channel aliases between producers and the hub actor
//! - `HubClosed`: what producers see once the hub has shut down
//! - `TrackedTasks`: the per-connection and per-session tasks

use fanout_core::{
    ConnectionId, HubStats, MessageWithRoom, MessageWithUser, Outbox, Subscription,
};
use std::future::Future;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Capacity of the hub's command mailbox.
///
/// One slot: a producer waits until the hub has taken its command,
/// so every producer is serialized against the hub's single consumer.
pub const HUB_MAILBOX: usize = 1;

/// Command flowing into the hub actor.
#[derive(Debug)]
pub enum HubCommand {
    Register {
        id: ConnectionId,
        user_id: Option<String>,
        outbox: Outbox,
    },
    Unregister(ConnectionId),
    SubscribeRoom(Subscription),
    UnsubscribeRoom(Subscription),
    Broadcast(MessageWithRoom),
    PrivateNotify(MessageWithUser),

    // Diagnostics.
    Stats(oneshot::Sender<HubStats>),
    RoomMembers {
        room: String,
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
    LookupUser {
        user_id: String,
        reply: oneshot::Sender<Option<ConnectionId>>,
    },

    Shutdown,
}

/// Channel from producers → hub actor.
pub type HubTx = mpsc::Sender<HubCommand>;
pub type HubRx = mpsc::Receiver<HubCommand>;

/// The hub actor is gone; the command was not processed.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("hub is closed")]
pub struct HubClosed;

/// Tasks spawned per peer: handshakes, connection halves, RPC sessions.
///
/// Shutdown waits for them through the tracker; once the grace period is
/// over, `abort_all` drops whatever is still running (and its sockets).
#[derive(Debug, Clone, Default)]
pub struct TrackedTasks {
    tracker: TaskTracker,
    abort: CancellationToken,
}

impl TrackedTasks {
    pub fn new() -> Self {
        TrackedTasks::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let abort = self.abort.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = abort.cancelled() => {}
                _ = task => {}
            }
        });
    }

    /// No more tasks are expected; `wait` can now complete.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Resolves once closed and every task has finished.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Stop every running task at its next await point.
    pub fn abort_all(&self) {
        self.abort.cancel();
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }
}
