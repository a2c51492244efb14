//! services/api/src/web/registry.rs
//!
//! Process-local registry of live push connections: socket -> user and
//! user -> room (the set of that user's connected sockets). This is a
//! non-durable cache owned by the transport layer, never a source of truth;
//! a restart simply drops every room and clients reconcile over REST.

use axum::extract::ws::Message;
use dashmap::{DashMap, DashSet};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for one live socket.
pub type ConnId = Uuid;

/// Buffered messages per connection before fan-out starts dropping.
pub const CONN_CHANNEL_BUFFER_SIZE: usize = 64;

/// State for a single connected socket.
struct ConnEntry {
    /// The room this socket has joined, if any. A socket belongs to at most
    /// one user room at a time.
    user_id: Option<Uuid>,
    /// Channel draining to the socket's write half.
    tx: mpsc::Sender<Message>,
    /// Server frames sent but not yet acknowledged, by ack id.
    pending_acks: DashMap<u64, Instant>,
}

/// Registry of connected sockets and their rooms.
pub struct ConnectionRegistry {
    conns: DashMap<ConnId, ConnEntry>,
    rooms: DashMap<Uuid, DashSet<ConnId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            conns: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Registers a new socket. It belongs to no room until it joins.
    pub fn register(&self, tx: mpsc::Sender<Message>) -> ConnId {
        let conn_id = Uuid::new_v4();
        self.conns.insert(
            conn_id,
            ConnEntry {
                user_id: None,
                tx,
                pending_acks: DashMap::new(),
            },
        );
        debug!(%conn_id, "socket registered");
        conn_id
    }

    /// Adds the socket to `user_id`'s room, leaving any previous room.
    pub fn join(&self, conn_id: ConnId, user_id: Uuid) {
        let Some(mut entry) = self.conns.get_mut(&conn_id) else {
            return;
        };
        if let Some(previous) = entry.user_id.replace(user_id) {
            self.remove_from_room(previous, conn_id);
        }
        self.rooms.entry(user_id).or_default().insert(conn_id);
        debug!(%conn_id, %user_id, "socket joined room");
    }

    /// Drops the socket and removes it from its room.
    pub fn unregister(&self, conn_id: ConnId) {
        if let Some((_, entry)) = self.conns.remove(&conn_id) {
            if let Some(user_id) = entry.user_id {
                self.remove_from_room(user_id, conn_id);
            }
            debug!(%conn_id, "socket unregistered");
        }
    }

    fn remove_from_room(&self, user_id: Uuid, conn_id: ConnId) {
        let mut drop_room = false;
        if let Some(room) = self.rooms.get(&user_id) {
            room.remove(&conn_id);
            drop_room = room.is_empty();
        }
        if drop_room {
            self.rooms.remove_if(&user_id, |_, room| room.is_empty());
        }
    }

    /// All senders currently joined to `user_id`'s room.
    pub fn room_senders(&self, user_id: Uuid) -> Vec<(ConnId, mpsc::Sender<Message>)> {
        let Some(room) = self.rooms.get(&user_id) else {
            return Vec::new();
        };
        room.iter()
            .filter_map(|conn_id| {
                let conn_id = *conn_id;
                self.conns
                    .get(&conn_id)
                    .map(|entry| (conn_id, entry.tx.clone()))
            })
            .collect()
    }

    pub fn room_size(&self, user_id: Uuid) -> usize {
        self.rooms.get(&user_id).map(|room| room.len()).unwrap_or(0)
    }

    /// Records a frame awaiting acknowledgment from `conn_id`.
    pub fn note_pending_ack(&self, conn_id: ConnId, ack_id: u64) {
        if let Some(entry) = self.conns.get(&conn_id) {
            entry.pending_acks.insert(ack_id, Instant::now());
        }
    }

    /// Resolves an acknowledgment. Returns false for an unknown ack id.
    pub fn resolve_ack(&self, conn_id: ConnId, ack_id: u64) -> bool {
        self.conns
            .get(&conn_id)
            .map(|entry| entry.pending_acks.remove(&ack_id).is_some())
            .unwrap_or(false)
    }

    /// Removes and returns ack ids outstanding longer than `timeout`, so the
    /// caller can log them once. Delivery is best-effort; nothing is retried.
    pub fn take_stale_acks(&self, conn_id: ConnId, timeout: Duration) -> Vec<u64> {
        let Some(entry) = self.conns.get(&conn_id) else {
            return Vec::new();
        };
        let stale: Vec<u64> = entry
            .pending_acks
            .iter()
            .filter(|kv| kv.value().elapsed() >= timeout)
            .map(|kv| *kv.key())
            .collect();
        for ack_id in &stale {
            entry.pending_acks.remove(ack_id);
        }
        stale
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        mpsc::channel(CONN_CHANNEL_BUFFER_SIZE)
    }

    #[tokio::test]
    async fn join_and_unregister_maintain_room_membership() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);

        registry.join(a, user);
        registry.join(b, user);
        assert_eq!(registry.room_size(user), 2);
        assert_eq!(registry.room_senders(user).len(), 2);

        registry.unregister(a);
        assert_eq!(registry.room_size(user), 1);
        registry.unregister(b);
        assert_eq!(registry.room_size(user), 0);
        assert!(registry.room_senders(user).is_empty());
    }

    #[tokio::test]
    async fn joining_a_new_room_leaves_the_previous_one() {
        let registry = ConnectionRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let (tx, _rx) = channel();
        let conn = registry.register(tx);

        registry.join(conn, first);
        assert_eq!(registry.room_size(first), 1);

        registry.join(conn, second);
        assert_eq!(registry.room_size(first), 0);
        assert_eq!(registry.room_size(second), 1);
    }

    #[tokio::test]
    async fn ack_tracking_resolves_and_expires() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let conn = registry.register(tx);

        registry.note_pending_ack(conn, 1);
        registry.note_pending_ack(conn, 2);

        assert!(registry.resolve_ack(conn, 1));
        assert!(!registry.resolve_ack(conn, 1));

        // Zero timeout: everything left is stale.
        let stale = registry.take_stale_acks(conn, Duration::from_secs(0));
        assert_eq!(stale, vec![2]);
        // Stale acks are only reported once.
        assert!(registry.take_stale_acks(conn, Duration::from_secs(0)).is_empty());
    }
}
