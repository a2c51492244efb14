//! crates/bookstore_core/src/notify.rs
//!
//! Helper for the create-then-fan-out sequence every notification producer
//! follows: persist the record first, then push to any live connections.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Notification, NotificationKind};
use crate::ports::{DatabaseService, NotificationPush, PortResult};

/// Creates a notification for `user_id` and fans it out to the user's room.
/// The store write is the durable step; the push is best-effort.
pub async fn notify(
    db: &Arc<dyn DatabaseService>,
    push: &Arc<dyn NotificationPush>,
    user_id: Uuid,
    title: &str,
    message: &str,
    kind: NotificationKind,
    link: Option<&str>,
) -> PortResult<Notification> {
    let notification = db
        .create_notification(user_id, title, message, kind, link)
        .await?;
    push.push_created(user_id, &notification).await;
    Ok(notification)
}
