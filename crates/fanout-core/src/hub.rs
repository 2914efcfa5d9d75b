//! Hub registries.
//!
//! [`Hub`] owns the three routing tables:
//! - registered connections and their outbound mailboxes,
//! - user id -> connection (at most one entry per id),
//! - room name -> member connections.
//!
//! It is a plain synchronous state machine. The server runs exactly one
//! of these inside the hub actor task, which is what makes lock-free
//! mutation safe: nothing else ever holds a `&mut Hub`.
//!
//! Delivery never blocks. Each recipient's mailbox is a bounded channel
//! and is fed with `try_send`; a recipient whose mailbox is full (or
//! whose receiver is gone) is evicted on the spot.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::error::HubError;
use crate::messages::{ConnectionId, MessageWithRoom, MessageWithUser, Payload};

/// Sending half of a connection's bounded outbound queue.
///
/// Dropping the last `Outbox` closes the queue, which is the signal for
/// the connection's writer task to say goodbye and exit.
pub type Outbox = mpsc::Sender<Payload>;

#[derive(Debug)]
struct Registered {
    user_id: Option<String>,
    outbox: Outbox,
}

/// Outcome of one broadcast / private notify.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Number of mailboxes that accepted the payload.
    pub delivered: usize,

    /// Connections that were unregistered because their mailbox refused it.
    pub evicted: Vec<ConnectionId>,
}

/// Registry sizes, for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    pub users: usize,
    pub rooms: usize,
}

#[derive(Debug, Default)]
pub struct Hub {
    connections: HashMap<ConnectionId, Registered>,
    users: HashMap<String, ConnectionId>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl Hub {
    pub fn new() -> Self {
        Hub::default()
    }

    /// Add a connection. A user id, if any, is indexed with last-write-wins:
    /// an earlier connection under the same id stays registered but is no
    /// longer reachable by private notify.
    pub fn register(&mut self, id: ConnectionId, user_id: Option<String>, outbox: Outbox) {
        if let Some(uid) = user_id.as_deref() {
            if let Some(previous) = self.users.insert(uid.to_owned(), id) {
                if previous != id {
                    debug!(user_id = uid, %previous, %id, "user index overwritten");
                }
            }
        }
        self.connections.insert(id, Registered { user_id, outbox });
    }

    /// Remove a connection from every room, the user index and the
    /// registry, closing its mailbox. Returns `false` if it was not
    /// registered (repeat calls are no-ops).
    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        let Some(entry) = self.connections.remove(&id) else {
            return false;
        };

        self.rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });

        if let Some(uid) = entry.user_id {
            // Only drop the index if a newer connection has not taken it over.
            if self.users.get(&uid) == Some(&id) {
                self.users.remove(&uid);
            }
        }

        // `entry.outbox` is dropped here, closing the queue.
        true
    }

    /// Add `id` to `room`, creating the room on first use.
    ///
    /// Requests for connections that are not (or no longer) registered are
    /// ignored so rooms only ever reference live connections.
    pub fn subscribe(&mut self, room: &str, id: ConnectionId) -> bool {
        if !self.connections.contains_key(&id) {
            debug!(%id, room, "subscribe for unknown connection ignored");
            return false;
        }
        self.rooms.entry(room.to_owned()).or_default().insert(id)
    }

    /// Remove `id` from `room`; the room is pruned once empty.
    pub fn unsubscribe(&mut self, room: &str, id: ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    /// Deliver to every registered connection (`room == None`) or to the
    /// members of one room. The payload is serialized once.
    pub fn broadcast(&mut self, msg: &MessageWithRoom) -> Result<Delivery, HubError> {
        let payload = msg.message.encode()?;

        let recipients: Vec<ConnectionId> = match msg.room.as_deref() {
            None => self.connections.keys().copied().collect(),
            Some(room) => match self.rooms.get(room) {
                Some(members) if !members.is_empty() => members.iter().copied().collect(),
                _ => return Err(HubError::UnknownRoom(room.to_owned())),
            },
        };

        Ok(self.deliver(&recipients, &payload))
    }

    /// Deliver to the connection indexed under `msg.user_id`.
    pub fn private_notify(&mut self, msg: &MessageWithUser) -> Result<Delivery, HubError> {
        let Some(&id) = self.users.get(&msg.user_id) else {
            return Err(HubError::UnknownUser(msg.user_id.clone()));
        };
        let payload = msg.message.encode()?;

        Ok(self.deliver(&[id], &payload))
    }

    /// Drop every registry entry, closing all mailboxes.
    pub fn clear(&mut self) {
        self.rooms.clear();
        self.users.clear();
        self.connections.clear();
    }

    pub fn lookup_user(&self, user_id: &str) -> Option<ConnectionId> {
        self.users.get(user_id).copied()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn has_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Members of `room`, sorted for stable output.
    pub fn room_members(&self, room: &str) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            users: self.users.len(),
            rooms: self.rooms.len(),
        }
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn deliver(&mut self, recipients: &[ConnectionId], payload: &Payload) -> Delivery {
        let mut delivery = Delivery::default();

        for &id in recipients {
            let Some(entry) = self.connections.get(&id) else {
                continue;
            };
            match entry.outbox.try_send(payload.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%id, "outbound queue full, evicting slow connection");
                    self.unregister(id);
                    delivery.evicted.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%id, "outbound queue closed, evicting connection");
                    self.unregister(id);
                    delivery.evicted.push(id);
                }
            }
        }

        delivery
    }
}
