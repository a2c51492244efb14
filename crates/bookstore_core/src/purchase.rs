//! crates/bookstore_core/src/purchase.rs
//!
//! The purchase orchestrator: given a verified payment, records the order,
//! grants the entitlement, and fans out notifications to the buyer and to
//! every administrator.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{NotificationKind, Order, PurchaseInput};
use crate::notify::notify;
use crate::ports::{DatabaseService, NotificationPush, PortError, PortResult};

/// Formats a minor-unit (paise) amount for user-facing notification text.
pub fn format_amount(amount_minor: i64) -> String {
    format!("₹{}.{:02}", amount_minor / 100, amount_minor % 100)
}

/// Result of recording a purchase.
#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub order: Order,
    /// True when this confirmation was a retry for a payment already on record.
    pub already_recorded: bool,
}

/// Records one verified payment.
///
/// The caller is responsible for having validated the payment receipt; this
/// function only performs the persistence and fan-out sequence:
///
/// 1. Fetch the book; an unknown book fails with `NotFound` before anything
///    is written.
/// 2. Insert the order. The gateway payment id is the idempotency key: if an
///    order for it already exists and matches this (user, book), the
///    existing order is returned and no duplicate notifications are emitted.
///    A replay against a different user or book grants nothing.
/// 3. Upsert the entitlement with `is_purchased = true` (idempotent).
/// 4. Success notification for the buyer, with a deep-link to the reader.
/// 5. Info notification for every admin, naming buyer, title, and amount.
///
/// The three stores are not wrapped in a single transaction; a failure after
/// step 2 surfaces as an error with no compensating rollback.
pub async fn complete_purchase(
    db: &Arc<dyn DatabaseService>,
    push: &Arc<dyn NotificationPush>,
    input: PurchaseInput,
) -> PortResult<PurchaseOutcome> {
    let book = db.get_book(input.book_id).await?;

    let order = match db.create_order(&input).await {
        Ok(order) => order,
        Err(PortError::Conflict(_)) => {
            // The payment id is already on record. Only a retry of the
            // original confirmation may re-grant the entitlement; a replay
            // carrying someone else's payment id grants nothing.
            let order = db.find_order_by_payment_id(&input.gateway_payment_id).await?;
            if order.user_id != input.user_id || order.book_id != input.book_id {
                warn!(
                    payment_id = %input.gateway_payment_id,
                    "payment id replayed for a different user or book"
                );
                return Err(PortError::Conflict(format!(
                    "Payment {} was recorded for a different purchase",
                    input.gateway_payment_id
                )));
            }
            warn!(
                payment_id = %input.gateway_payment_id,
                "duplicate purchase confirmation, returning existing order"
            );
            db.grant_entitlement(input.user_id, input.book_id).await?;
            return Ok(PurchaseOutcome {
                order,
                already_recorded: true,
            });
        }
        Err(e) => return Err(e),
    };

    db.grant_entitlement(input.user_id, input.book_id).await?;

    let buyer = db.get_user(input.user_id).await?;

    notify(
        db,
        push,
        input.user_id,
        "Purchase successful",
        &format!("You can now read \"{}\". Happy reading!", book.title),
        NotificationKind::Success,
        Some(&format!("/read/{}", book.id)),
    )
    .await?;

    let admin_message = format!(
        "{} purchased \"{}\" for {}",
        buyer.name,
        book.title,
        format_amount(order.amount_minor)
    );
    for admin in db.list_admins().await? {
        notify(
            db,
            push,
            admin.id,
            "New purchase",
            &admin_message,
            NotificationKind::Info,
            Some(&format!("/admin/orders/{}", order.id)),
        )
        .await?;
    }

    info!(
        order_id = %order.id,
        user_id = %input.user_id,
        book_id = %input.book_id,
        amount = order.amount_minor,
        "purchase recorded"
    );

    Ok(PurchaseOutcome {
        order,
        already_recorded: false,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{
        AuthUser, Book, BookStatus, EntitlementRecord, Notification, Role, User,
    };

    //=====================================================================================
    // In-memory fakes for the ports
    //=====================================================================================

    #[derive(Default)]
    struct MemDbInner {
        users: HashMap<Uuid, User>,
        books: HashMap<Uuid, Book>,
        orders: Vec<Order>,
        entitlements: HashMap<(Uuid, Uuid), EntitlementRecord>,
        notifications: Vec<Notification>,
    }

    #[derive(Default)]
    struct MemDb {
        inner: Mutex<MemDbInner>,
    }

    impl MemDb {
        fn add_user(&self, name: &str, role: Role) -> Uuid {
            let id = Uuid::new_v4();
            self.inner.lock().unwrap().users.insert(
                id,
                User {
                    id,
                    name: name.to_string(),
                    email: format!("{name}@example.com"),
                    role,
                    created_at: Utc::now(),
                },
            );
            id
        }

        fn add_book(&self, title: &str, price_minor: i64) -> Uuid {
            let id = Uuid::new_v4();
            self.inner.lock().unwrap().books.insert(
                id,
                Book {
                    id,
                    title: title.to_string(),
                    author: "Author".to_string(),
                    price_minor,
                    status: BookStatus::Published,
                    read_count: 0,
                    download_count: 0,
                },
            );
            id
        }

        fn order_count(&self) -> usize {
            self.inner.lock().unwrap().orders.len()
        }

        fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
            self.inner
                .lock()
                .unwrap()
                .notifications
                .iter()
                .filter(|n| n.user_id == user_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl DatabaseService for MemDb {
        async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
            self.inner
                .lock()
                .unwrap()
                .users
                .get(&user_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("User {user_id}")))
        }

        async fn list_admins(&self) -> PortResult<Vec<User>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .users
                .values()
                .filter(|u| u.role == Role::Admin)
                .cloned()
                .collect())
        }

        async fn validate_auth_token(&self, _token: &str) -> PortResult<AuthUser> {
            Err(PortError::Unauthorized)
        }

        async fn get_book(&self, book_id: Uuid) -> PortResult<Book> {
            self.inner
                .lock()
                .unwrap()
                .books
                .get(&book_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("Book {book_id}")))
        }

        async fn create_order(&self, input: &PurchaseInput) -> PortResult<Order> {
            let mut inner = self.inner.lock().unwrap();
            if inner
                .orders
                .iter()
                .any(|o| o.gateway_payment_id == input.gateway_payment_id)
            {
                return Err(PortError::Conflict(input.gateway_payment_id.clone()));
            }
            let order = Order {
                id: Uuid::new_v4(),
                user_id: input.user_id,
                book_id: input.book_id,
                gateway_payment_id: input.gateway_payment_id.clone(),
                gateway_order_id: input.gateway_order_id.clone(),
                amount_minor: input.amount_minor,
                payment_method: input.payment_method.clone(),
                status: "completed".to_string(),
                created_at: Utc::now(),
            };
            inner.orders.push(order.clone());
            Ok(order)
        }

        async fn find_order_by_payment_id(&self, gateway_payment_id: &str) -> PortResult<Order> {
            self.inner
                .lock()
                .unwrap()
                .orders
                .iter()
                .find(|o| o.gateway_payment_id == gateway_payment_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(gateway_payment_id.to_string()))
        }

        async fn orders_for_user(&self, user_id: Uuid) -> PortResult<Vec<Order>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .orders
                .iter()
                .filter(|o| o.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn all_orders(&self) -> PortResult<Vec<Order>> {
            Ok(self.inner.lock().unwrap().orders.clone())
        }

        async fn grant_entitlement(
            &self,
            user_id: Uuid,
            book_id: Uuid,
        ) -> PortResult<EntitlementRecord> {
            let mut inner = self.inner.lock().unwrap();
            let now = Utc::now();
            let record = inner
                .entitlements
                .entry((user_id, book_id))
                .or_insert_with(|| EntitlementRecord {
                    id: Uuid::new_v4(),
                    user_id,
                    book_id,
                    current_chapter: 0,
                    position: 0.0,
                    is_purchased: false,
                    is_favorite: false,
                    created_at: now,
                    updated_at: now,
                });
            record.is_purchased = true;
            record.updated_at = now;
            Ok(record.clone())
        }

        async fn entitlement_for(
            &self,
            user_id: Uuid,
            book_id: Uuid,
        ) -> PortResult<Option<EntitlementRecord>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .entitlements
                .get(&(user_id, book_id))
                .cloned())
        }

        async fn purchased_books(&self, user_id: Uuid) -> PortResult<Vec<Book>> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .entitlements
                .values()
                .filter(|e| e.user_id == user_id && e.is_purchased)
                .filter_map(|e| inner.books.get(&e.book_id).cloned())
                .collect())
        }

        async fn create_notification(
            &self,
            user_id: Uuid,
            title: &str,
            message: &str,
            kind: NotificationKind,
            link: Option<&str>,
        ) -> PortResult<Notification> {
            let notification = Notification {
                id: Uuid::new_v4(),
                user_id,
                title: title.to_string(),
                message: message.to_string(),
                kind,
                link: link.map(|l| l.to_string()),
                read: false,
                created_at: Utc::now(),
            };
            self.inner
                .lock()
                .unwrap()
                .notifications
                .push(notification.clone());
            Ok(notification)
        }

        async fn notifications_for_user(&self, user_id: Uuid) -> PortResult<Vec<Notification>> {
            let mut items = self.notifications_for(user_id);
            items.reverse();
            items.truncate(50);
            Ok(items)
        }

        async fn unread_count(&self, user_id: Uuid) -> PortResult<i64> {
            Ok(self
                .notifications_for(user_id)
                .iter()
                .filter(|n| !n.read)
                .count() as i64)
        }

        async fn mark_notification_read(
            &self,
            notification_id: Uuid,
            user_id: Uuid,
        ) -> PortResult<Notification> {
            let mut inner = self.inner.lock().unwrap();
            let notification = inner
                .notifications
                .iter_mut()
                .find(|n| n.id == notification_id && n.user_id == user_id)
                .ok_or_else(|| PortError::NotFound(format!("Notification {notification_id}")))?;
            notification.read = true;
            Ok(notification.clone())
        }

        async fn mark_all_read(&self, user_id: Uuid) -> PortResult<u64> {
            let mut inner = self.inner.lock().unwrap();
            let mut updated = 0;
            for n in inner
                .notifications
                .iter_mut()
                .filter(|n| n.user_id == user_id && !n.read)
            {
                n.read = true;
                updated += 1;
            }
            Ok(updated)
        }

        async fn clear_notifications(&self, user_id: Uuid) -> PortResult<u64> {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.notifications.len();
            inner.notifications.retain(|n| n.user_id != user_id);
            Ok((before - inner.notifications.len()) as u64)
        }
    }

    /// Records every push without delivering anywhere.
    #[derive(Default)]
    struct RecordingPush {
        created: Mutex<Vec<(Uuid, Uuid)>>,
    }

    #[async_trait]
    impl NotificationPush for RecordingPush {
        async fn push_created(&self, user_id: Uuid, notification: &Notification) {
            self.created
                .lock()
                .unwrap()
                .push((user_id, notification.id));
        }

        async fn push_state(&self, _user_id: Uuid) {}
    }

    fn input(user_id: Uuid, book_id: Uuid, payment_id: &str) -> PurchaseInput {
        PurchaseInput {
            user_id,
            book_id,
            gateway_payment_id: payment_id.to_string(),
            gateway_order_id: "order_gw_1".to_string(),
            amount_minor: 19900,
            payment_method: "card".to_string(),
        }
    }

    //=====================================================================================
    // Tests
    //=====================================================================================

    #[tokio::test]
    async fn purchase_records_order_entitlement_and_notifications() {
        let mem = Arc::new(MemDb::default());
        let db: Arc<dyn DatabaseService> = mem.clone();
        let push_impl = Arc::new(RecordingPush::default());
        let push: Arc<dyn NotificationPush> = push_impl.clone();

        let buyer = mem.add_user("rahul", Role::User);
        let admin_a = mem.add_user("admin-a", Role::Admin);
        let admin_b = mem.add_user("admin-b", Role::Admin);
        let book = mem.add_book("The Rust Book", 19900);

        let outcome = complete_purchase(&db, &push, input(buyer, book, "pay_1"))
            .await
            .unwrap();

        assert!(!outcome.already_recorded);
        assert_eq!(outcome.order.amount_minor, 19900);
        assert_eq!(outcome.order.status, "completed");
        assert_eq!(mem.order_count(), 1);

        let entitlement = db.entitlement_for(buyer, book).await.unwrap().unwrap();
        assert!(entitlement.is_purchased);

        // Exactly one success notification for the buyer, one info per admin.
        let buyer_notifications = mem.notifications_for(buyer);
        assert_eq!(buyer_notifications.len(), 1);
        assert_eq!(buyer_notifications[0].kind, NotificationKind::Success);
        assert_eq!(
            buyer_notifications[0].link.as_deref(),
            Some(format!("/read/{book}").as_str())
        );

        assert_eq!(mem.notifications_for(admin_a).len(), 1);
        assert_eq!(mem.notifications_for(admin_b).len(), 1);
        let admin_note = &mem.notifications_for(admin_a)[0];
        assert_eq!(admin_note.kind, NotificationKind::Info);
        assert!(admin_note.message.contains("rahul"));
        assert!(admin_note.message.contains("The Rust Book"));
        assert!(admin_note.message.contains("₹199.00"));

        // One fan-out per created notification.
        assert_eq!(push_impl.created.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_payment_id_returns_existing_order_without_new_notifications() {
        let mem = Arc::new(MemDb::default());
        let db: Arc<dyn DatabaseService> = mem.clone();
        let push_impl = Arc::new(RecordingPush::default());
        let push: Arc<dyn NotificationPush> = push_impl.clone();

        let buyer = mem.add_user("asha", Role::User);
        mem.add_user("admin", Role::Admin);
        let book = mem.add_book("Async in Depth", 14900);

        let first = complete_purchase(&db, &push, input(buyer, book, "pay_dup"))
            .await
            .unwrap();
        let pushes_after_first = push_impl.created.lock().unwrap().len();

        let second = complete_purchase(&db, &push, input(buyer, book, "pay_dup"))
            .await
            .unwrap();

        assert!(!first.already_recorded);
        assert!(second.already_recorded);
        assert_eq!(first.order.id, second.order.id);
        assert_eq!(mem.order_count(), 1);
        assert_eq!(push_impl.created.lock().unwrap().len(), pushes_after_first);
        assert_eq!(mem.notifications_for(buyer).len(), 1);
    }

    #[tokio::test]
    async fn replayed_payment_id_for_a_different_purchase_grants_nothing() {
        let mem = Arc::new(MemDb::default());
        let db: Arc<dyn DatabaseService> = mem.clone();
        let push_impl = Arc::new(RecordingPush::default());
        let push: Arc<dyn NotificationPush> = push_impl.clone();

        let buyer = mem.add_user("buyer", Role::User);
        let freeloader = mem.add_user("freeloader", Role::User);
        let book_a = mem.add_book("Paid For", 19900);
        let book_b = mem.add_book("Not Paid For", 9900);

        complete_purchase(&db, &push, input(buyer, book_a, "pay_replay"))
            .await
            .unwrap();

        // Someone else submits the buyer's payment id for a different book.
        let err = complete_purchase(&db, &push, input(freeloader, book_b, "pay_replay"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
        assert!(db
            .entitlement_for(freeloader, book_b)
            .await
            .unwrap()
            .is_none());

        // The buyer replaying their own purchase for another book is
        // rejected the same way.
        let err = complete_purchase(&db, &push, input(buyer, book_b, "pay_replay"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
        assert!(db.entitlement_for(buyer, book_b).await.unwrap().is_none());

        assert_eq!(mem.order_count(), 1);
    }

    #[tokio::test]
    async fn unknown_book_fails_before_any_write() {
        let mem = Arc::new(MemDb::default());
        let db: Arc<dyn DatabaseService> = mem.clone();
        let push_impl = Arc::new(RecordingPush::default());
        let push: Arc<dyn NotificationPush> = push_impl.clone();

        let buyer = mem.add_user("buyer", Role::User);

        let err = complete_purchase(&db, &push, input(buyer, Uuid::new_v4(), "pay_nb"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        assert_eq!(mem.order_count(), 0);
        assert!(mem.notifications_for(buyer).is_empty());
    }

    #[tokio::test]
    async fn entitlement_upsert_is_idempotent() {
        let mem = Arc::new(MemDb::default());
        let db: Arc<dyn DatabaseService> = mem.clone();

        let user = mem.add_user("lee", Role::User);
        let book = mem.add_book("Ownership", 9900);

        db.grant_entitlement(user, book).await.unwrap();
        db.grant_entitlement(user, book).await.unwrap();

        assert_eq!(mem.inner.lock().unwrap().entitlements.len(), 1);
        let record = db.entitlement_for(user, book).await.unwrap().unwrap();
        assert!(record.is_purchased);
    }

    #[tokio::test]
    async fn mark_all_read_only_touches_owner() {
        let mem = Arc::new(MemDb::default());
        let db: Arc<dyn DatabaseService> = mem.clone();

        let a = mem.add_user("a", Role::User);
        let b = mem.add_user("b", Role::User);
        for _ in 0..3 {
            db.create_notification(a, "t", "m", NotificationKind::Info, None)
                .await
                .unwrap();
        }
        db.create_notification(b, "t", "m", NotificationKind::Info, None)
            .await
            .unwrap();

        let updated = db.mark_all_read(a).await.unwrap();
        assert_eq!(updated, 3);
        assert_eq!(db.unread_count(a).await.unwrap(), 0);
        assert_eq!(db.unread_count(b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_read_for_foreign_notification_is_not_found() {
        let mem = Arc::new(MemDb::default());
        let db: Arc<dyn DatabaseService> = mem.clone();

        let owner = mem.add_user("owner", Role::User);
        let other = mem.add_user("other", Role::User);
        let n = db
            .create_notification(owner, "t", "m", NotificationKind::Info, None)
            .await
            .unwrap();

        let err = db.mark_notification_read(n.id, other).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        // Target notification untouched.
        assert_eq!(db.unread_count(owner).await.unwrap(), 1);
    }

    #[test]
    fn amount_formatting() {
        assert_eq!(format_amount(19900), "₹199.00");
        assert_eq!(format_amount(105), "₹1.05");
        assert_eq!(format_amount(50), "₹0.50");
    }
}
