//! crates/bookstore_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A user's role, controlling access to the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

// Represents a registered user - used throughout the app.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The identity the auth middleware attaches to each authenticated request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookStatus {
    Draft,
    Published,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Draft => "draft",
            BookStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(BookStatus::Draft),
            "published" => Some(BookStatus::Published),
            _ => None,
        }
    }
}

/// A catalog entry. Read-only from this core's perspective; the counters
/// are incremented by the reader/download collaborators.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    /// Price in minor currency units (paise).
    pub price_minor: i64,
    pub status: BookStatus,
    pub read_count: i64,
    pub download_count: i64,
}

/// Durable per-(user, book) purchase state and reading progress.
///
/// At most one record exists per (user, book) pair. Created lazily, either by
/// the first progress event (unpurchased) or by the purchase orchestrator
/// (purchased). `is_purchased` transitions false -> true exactly once and is
/// never reset here.
#[derive(Debug, Clone)]
pub struct EntitlementRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub current_chapter: i32,
    pub position: f64,
    pub is_purchased: bool,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One completed payment. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub gateway_payment_id: String,
    pub gateway_order_id: String,
    /// Amount in minor currency units (paise).
    pub amount_minor: i64,
    pub payment_method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(NotificationKind::Info),
            "success" => Some(NotificationKind::Success),
            "warning" => Some(NotificationKind::Warning),
            "error" => Some(NotificationKind::Error),
            _ => None,
        }
    }
}

/// A per-user message, owned exclusively by one user.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything the purchase orchestrator needs to record one verified payment.
#[derive(Debug, Clone)]
pub struct PurchaseInput {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub gateway_payment_id: String,
    pub gateway_order_id: String,
    pub amount_minor: i64,
    pub payment_method: String,
}
