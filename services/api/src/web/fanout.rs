//! services/api/src/web/fanout.rs
//!
//! Notification fan-out: pushes notification-state snapshots and individual
//! events to every socket in a user's room. A user with no live sockets is a
//! no-op; the client catches up over REST on its next connect. State is
//! always re-read from the store, never assembled from in-memory deltas.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message;
use bookstore_core::domain::Notification;
use bookstore_core::ports::{DatabaseService, NotificationPush};
use push_channel::protocol::{NotificationDto, ServerFrame};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::web::registry::{ConnId, ConnectionRegistry};

/// Converts a domain notification to its wire representation.
pub fn to_dto(notification: &Notification) -> NotificationDto {
    NotificationDto {
        id: notification.id,
        title: notification.title.clone(),
        message: notification.message.clone(),
        kind: notification.kind.as_str().to_string(),
        link: notification.link.clone(),
        read: notification.read,
        created_at: notification.created_at,
    }
}

/// The concrete `NotificationPush` implementation for the WebSocket transport.
pub struct FanOut {
    db: Arc<dyn DatabaseService>,
    registry: Arc<ConnectionRegistry>,
    ack_seq: AtomicU64,
}

impl FanOut {
    pub fn new(db: Arc<dyn DatabaseService>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            db,
            registry,
            ack_seq: AtomicU64::new(1),
        }
    }

    fn next_ack_id(&self) -> u64 {
        self.ack_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends one frame to every socket in the room. `try_send` failures
    /// (slow or gone clients) are logged and never retried.
    fn broadcast(&self, targets: &[(ConnId, mpsc::Sender<Message>)], frame: &ServerFrame) {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize push frame: {e}");
                return;
            }
        };
        let ack_id = match frame {
            ServerFrame::NewNotification { ack_id, .. }
            | ServerFrame::Notifications { ack_id, .. }
            | ServerFrame::UnreadCount { ack_id, .. } => Some(*ack_id),
            _ => None,
        };
        for (conn_id, tx) in targets {
            if tx.try_send(Message::Text(json.clone().into())).is_ok() {
                if let Some(ack_id) = ack_id {
                    self.registry.note_pending_ack(*conn_id, ack_id);
                }
            } else {
                warn!(%conn_id, "push buffer full or closed, dropping frame");
            }
        }
    }

    /// Re-reads the user's notification state and emits it to the given sockets.
    async fn emit_state(&self, user_id: Uuid, targets: &[(ConnId, mpsc::Sender<Message>)]) {
        let items = match self.db.notifications_for_user(user_id).await {
            Ok(items) => items.iter().map(to_dto).collect(),
            Err(e) => {
                error!(%user_id, "failed to read notifications for fan-out: {e}");
                return;
            }
        };
        self.broadcast(
            targets,
            &ServerFrame::Notifications {
                ack_id: self.next_ack_id(),
                items,
            },
        );

        match self.db.unread_count(user_id).await {
            Ok(count) => self.broadcast(
                targets,
                &ServerFrame::UnreadCount {
                    ack_id: self.next_ack_id(),
                    count,
                },
            ),
            Err(e) => error!(%user_id, "failed to read unread count for fan-out: {e}"),
        }
    }
}

#[async_trait]
impl NotificationPush for FanOut {
    async fn push_created(&self, user_id: Uuid, notification: &Notification) {
        let targets = self.registry.room_senders(user_id);
        if targets.is_empty() {
            debug!(%user_id, "no live sockets, skipping fan-out");
            return;
        }
        self.broadcast(
            &targets,
            &ServerFrame::NewNotification {
                ack_id: self.next_ack_id(),
                notification: to_dto(notification),
            },
        );
        self.emit_state(user_id, &targets).await;
    }

    async fn push_state(&self, user_id: Uuid) {
        let targets = self.registry.room_senders(user_id);
        if targets.is_empty() {
            debug!(%user_id, "no live sockets, skipping fan-out");
            return;
        }
        self.emit_state(user_id, &targets).await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bookstore_core::domain::{
        AuthUser, Book, EntitlementRecord, NotificationKind, Order, PurchaseInput, User,
    };
    use bookstore_core::ports::{PortError, PortResult};
    use chrono::Utc;

    use super::*;
    use crate::web::registry::CONN_CHANNEL_BUFFER_SIZE;

    /// Store stub that serves a fixed notification list.
    struct StubDb {
        items: Vec<Notification>,
    }

    #[async_trait]
    impl DatabaseService for StubDb {
        async fn get_user(&self, _: Uuid) -> PortResult<User> {
            Err(PortError::Unexpected("not used".into()))
        }
        async fn list_admins(&self) -> PortResult<Vec<User>> {
            Ok(Vec::new())
        }
        async fn validate_auth_token(&self, _: &str) -> PortResult<AuthUser> {
            Err(PortError::Unauthorized)
        }
        async fn get_book(&self, _: Uuid) -> PortResult<Book> {
            Err(PortError::Unexpected("not used".into()))
        }
        async fn create_order(&self, _: &PurchaseInput) -> PortResult<Order> {
            Err(PortError::Unexpected("not used".into()))
        }
        async fn find_order_by_payment_id(&self, _: &str) -> PortResult<Order> {
            Err(PortError::Unexpected("not used".into()))
        }
        async fn orders_for_user(&self, _: Uuid) -> PortResult<Vec<Order>> {
            Ok(Vec::new())
        }
        async fn all_orders(&self) -> PortResult<Vec<Order>> {
            Ok(Vec::new())
        }
        async fn grant_entitlement(&self, _: Uuid, _: Uuid) -> PortResult<EntitlementRecord> {
            Err(PortError::Unexpected("not used".into()))
        }
        async fn entitlement_for(
            &self,
            _: Uuid,
            _: Uuid,
        ) -> PortResult<Option<EntitlementRecord>> {
            Ok(None)
        }
        async fn purchased_books(&self, _: Uuid) -> PortResult<Vec<Book>> {
            Ok(Vec::new())
        }
        async fn create_notification(
            &self,
            _: Uuid,
            _: &str,
            _: &str,
            _: NotificationKind,
            _: Option<&str>,
        ) -> PortResult<Notification> {
            Err(PortError::Unexpected("not used".into()))
        }
        async fn notifications_for_user(&self, _: Uuid) -> PortResult<Vec<Notification>> {
            Ok(self.items.clone())
        }
        async fn unread_count(&self, _: Uuid) -> PortResult<i64> {
            Ok(self.items.iter().filter(|n| !n.read).count() as i64)
        }
        async fn mark_notification_read(&self, _: Uuid, _: Uuid) -> PortResult<Notification> {
            Err(PortError::Unexpected("not used".into()))
        }
        async fn mark_all_read(&self, _: Uuid) -> PortResult<u64> {
            Ok(0)
        }
        async fn clear_notifications(&self, _: Uuid) -> PortResult<u64> {
            Ok(0)
        }
    }

    fn notification(user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            title: "Purchase successful".into(),
            message: "Enjoy the book".into(),
            kind: NotificationKind::Success,
            link: None,
            read: false,
            created_at: Utc::now(),
        }
    }

    fn decode(msg: Message) -> ServerFrame {
        match msg {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_room_is_a_no_op() {
        let user = Uuid::new_v4();
        let n = notification(user);
        let db = Arc::new(StubDb {
            items: vec![n.clone()],
        });
        let registry = Arc::new(ConnectionRegistry::new());
        let fanout = FanOut::new(db.clone(), registry);

        // Nothing connected; must not error or panic. The store still holds
        // the data for the REST backfill.
        fanout.push_created(user, &n).await;
        assert_eq!(db.notifications_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn both_sockets_in_a_room_receive_the_new_notification() {
        let user = Uuid::new_v4();
        let n = notification(user);
        let db = Arc::new(StubDb {
            items: vec![n.clone()],
        });
        let registry = Arc::new(ConnectionRegistry::new());

        let (tx_a, mut rx_a) = mpsc::channel(CONN_CHANNEL_BUFFER_SIZE);
        let (tx_b, mut rx_b) = mpsc::channel(CONN_CHANNEL_BUFFER_SIZE);
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);
        registry.join(a, user);
        registry.join(b, user);

        let fanout = FanOut::new(db, registry.clone());
        fanout.push_created(user, &n).await;

        // Each socket gets the same three frames: new, list, unread count.
        for rx in [&mut rx_a, &mut rx_b] {
            match decode(rx.recv().await.unwrap()) {
                ServerFrame::NewNotification { notification, .. } => {
                    assert_eq!(notification.id, n.id);
                    assert_eq!(notification.kind, "success");
                }
                other => panic!("expected new_notification, got {other:?}"),
            }
            match decode(rx.recv().await.unwrap()) {
                ServerFrame::Notifications { items, .. } => assert_eq!(items.len(), 1),
                other => panic!("expected notifications, got {other:?}"),
            }
            match decode(rx.recv().await.unwrap()) {
                ServerFrame::UnreadCount { count, .. } => assert_eq!(count, 1),
                other => panic!("expected unread_count, got {other:?}"),
            }
        }
    }
}
