//! crates/bookstore_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or the
//! payment provider.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AuthUser, Book, EntitlementRecord, Notification, NotificationKind, Order, PurchaseInput, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, gateway).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users & Auth ---
    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn list_admins(&self) -> PortResult<Vec<User>>;

    /// Resolves a bearer token to the requesting user's identity and role.
    async fn validate_auth_token(&self, token: &str) -> PortResult<AuthUser>;

    // --- Books ---
    async fn get_book(&self, book_id: Uuid) -> PortResult<Book>;

    // --- Order Ledger ---
    /// Inserts a completed order. Returns `Conflict` if an order with the
    /// same gateway payment id already exists (the idempotency key).
    async fn create_order(&self, input: &PurchaseInput) -> PortResult<Order>;

    async fn find_order_by_payment_id(&self, gateway_payment_id: &str) -> PortResult<Order>;

    async fn orders_for_user(&self, user_id: Uuid) -> PortResult<Vec<Order>>;

    async fn all_orders(&self) -> PortResult<Vec<Order>>;

    // --- Entitlement Store ---
    /// Upserts the (user, book) entitlement with `is_purchased = true`.
    /// Idempotent: calling it again for the same pair leaves one record.
    async fn grant_entitlement(&self, user_id: Uuid, book_id: Uuid)
        -> PortResult<EntitlementRecord>;

    async fn entitlement_for(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> PortResult<Option<EntitlementRecord>>;

    async fn purchased_books(&self, user_id: Uuid) -> PortResult<Vec<Book>>;

    // --- Notification Store ---
    async fn create_notification(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        kind: NotificationKind,
        link: Option<&str>,
    ) -> PortResult<Notification>;

    /// Newest first, capped at 50.
    async fn notifications_for_user(&self, user_id: Uuid) -> PortResult<Vec<Notification>>;

    async fn unread_count(&self, user_id: Uuid) -> PortResult<i64>;

    /// Fails with `NotFound` if the notification does not exist or does not
    /// belong to `user_id`.
    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Notification>;

    /// Returns the number of rows updated.
    async fn mark_all_read(&self, user_id: Uuid) -> PortResult<u64>;

    /// Deletes all of the user's notifications. Returns the number deleted.
    async fn clear_notifications(&self, user_id: Uuid) -> PortResult<u64>;
}

#[async_trait]
pub trait PaymentGatewayService: Send + Sync {
    /// Pre-registers a payment intent with the external provider and returns
    /// the gateway's order id. Fails with `Invalid` for a non-positive amount
    /// and `Unexpected` when the provider call errors (surfaced as 5xx, not
    /// retried at this layer).
    async fn create_gateway_order(&self, amount_minor: i64, currency: &str) -> PortResult<String>;

    /// Recomputes the HMAC over `order_id + "|" + payment_id` with the
    /// server-held secret and compares it against the supplied signature.
    /// This is the sole trust boundary converting a client-submitted payload
    /// into a "payment happened" fact.
    async fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> PortResult<bool>;
}

/// The fan-out seam. Implementations push notification state to whatever live
/// connections the user currently holds; a user with no connections is a
/// no-op (REST is the reconciliation path). Best-effort by contract, so these
/// methods never surface errors to the caller.
#[async_trait]
pub trait NotificationPush: Send + Sync {
    /// Announce one newly created notification, then the refreshed state.
    async fn push_created(&self, user_id: Uuid, notification: &Notification);

    /// Push the user's full notification list and unread count, re-read from
    /// the store.
    async fn push_state(&self, user_id: Uuid);
}
