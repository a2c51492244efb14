//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use bookstore_core::domain::{
    AuthUser, Book, BookStatus, EntitlementRecord, Notification, NotificationKind, Order,
    PurchaseInput, Role, User,
};
use bookstore_core::ports::{DatabaseService, PortError, PortResult};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: Role::parse(&self.role).unwrap_or(Role::User),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    title: String,
    author: String,
    price_minor: i64,
    status: String,
    read_count: i64,
    download_count: i64,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            title: self.title,
            author: self.author,
            price_minor: self.price_minor,
            status: BookStatus::parse(&self.status).unwrap_or(BookStatus::Draft),
            read_count: self.read_count,
            download_count: self.download_count,
        }
    }
}

#[derive(FromRow)]
struct OrderRecord {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    gateway_payment_id: String,
    gateway_order_id: String,
    amount_minor: i64,
    payment_method: String,
    status: String,
    created_at: DateTime<Utc>,
}
impl OrderRecord {
    fn to_domain(self) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            gateway_payment_id: self.gateway_payment_id,
            gateway_order_id: self.gateway_order_id,
            amount_minor: self.amount_minor,
            payment_method: self.payment_method,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct EntitlementRow {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    current_chapter: i32,
    position: f64,
    is_purchased: bool,
    is_favorite: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl EntitlementRow {
    fn to_domain(self) -> EntitlementRecord {
        EntitlementRecord {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            current_chapter: self.current_chapter,
            position: self.position,
            is_purchased: self.is_purchased,
            is_favorite: self.is_favorite,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    message: String,
    kind: String,
    link: Option<String>,
    read: bool,
    created_at: DateTime<Utc>,
}
impl NotificationRecord {
    fn to_domain(self) -> Notification {
        Notification {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            kind: NotificationKind::parse(&self.kind).unwrap_or(NotificationKind::Info),
            link: self.link,
            read: self.read,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, role, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn list_admins(&self) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, role, created_at FROM users WHERE role = 'admin'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn validate_auth_token(&self, token: &str) -> PortResult<AuthUser> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.name, u.email, u.role, u.created_at
             FROM auth_sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = $1 AND s.expires_at > now()",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            _ => unexpected(e),
        })?;
        let user = record.to_domain();
        Ok(AuthUser {
            user_id: user.id,
            role: user.role,
        })
    }

    async fn get_book(&self, book_id: Uuid) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(
            "SELECT id, title, author, price_minor, status, read_count, download_count
             FROM books WHERE id = $1",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Book {} not found", book_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_order(&self, input: &PurchaseInput) -> PortResult<Order> {
        let record = sqlx::query_as::<_, OrderRecord>(
            "INSERT INTO orders
                 (user_id, book_id, gateway_payment_id, gateway_order_id, amount_minor, payment_method)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, user_id, book_id, gateway_payment_id, gateway_order_id,
                       amount_minor, payment_method, status, created_at",
        )
        .bind(input.user_id)
        .bind(input.book_id)
        .bind(&input.gateway_payment_id)
        .bind(&input.gateway_order_id)
        .bind(input.amount_minor)
        .bind(&input.payment_method)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                PortError::Conflict(format!(
                    "Order for payment {} already exists",
                    input.gateway_payment_id
                ))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn find_order_by_payment_id(&self, gateway_payment_id: &str) -> PortResult<Order> {
        let record = sqlx::query_as::<_, OrderRecord>(
            "SELECT id, user_id, book_id, gateway_payment_id, gateway_order_id,
                    amount_minor, payment_method, status, created_at
             FROM orders WHERE gateway_payment_id = $1",
        )
        .bind(gateway_payment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Order for payment {} not found", gateway_payment_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> PortResult<Vec<Order>> {
        let records = sqlx::query_as::<_, OrderRecord>(
            "SELECT id, user_id, book_id, gateway_payment_id, gateway_order_id,
                    amount_minor, payment_method, status, created_at
             FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn all_orders(&self) -> PortResult<Vec<Order>> {
        let records = sqlx::query_as::<_, OrderRecord>(
            "SELECT id, user_id, book_id, gateway_payment_id, gateway_order_id,
                    amount_minor, payment_method, status, created_at
             FROM orders ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn grant_entitlement(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> PortResult<EntitlementRecord> {
        let record = sqlx::query_as::<_, EntitlementRow>(
            "INSERT INTO entitlements (user_id, book_id, is_purchased)
             VALUES ($1, $2, TRUE)
             ON CONFLICT (user_id, book_id)
             DO UPDATE SET is_purchased = TRUE, updated_at = now()
             RETURNING id, user_id, book_id, current_chapter, position,
                       is_purchased, is_favorite, created_at, updated_at",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn entitlement_for(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> PortResult<Option<EntitlementRecord>> {
        let record = sqlx::query_as::<_, EntitlementRow>(
            "SELECT id, user_id, book_id, current_chapter, position,
                    is_purchased, is_favorite, created_at, updated_at
             FROM entitlements WHERE user_id = $1 AND book_id = $2",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn purchased_books(&self, user_id: Uuid) -> PortResult<Vec<Book>> {
        let records = sqlx::query_as::<_, BookRecord>(
            "SELECT b.id, b.title, b.author, b.price_minor, b.status, b.read_count, b.download_count
             FROM books b JOIN entitlements e ON e.book_id = b.id
             WHERE e.user_id = $1 AND e.is_purchased
             ORDER BY e.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_notification(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        kind: NotificationKind,
        link: Option<&str>,
    ) -> PortResult<Notification> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            "INSERT INTO notifications (user_id, title, message, kind, link)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, user_id, title, message, kind, link, read, created_at",
        )
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(kind.as_str())
        .bind(link)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn notifications_for_user(&self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            "SELECT id, user_id, title, message, kind, link, read, created_at
             FROM notifications WHERE user_id = $1
             ORDER BY created_at DESC LIMIT 50",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn unread_count(&self, user_id: Uuid) -> PortResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count)
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Notification> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            "UPDATE notifications SET read = TRUE
             WHERE id = $1 AND user_id = $2
             RETURNING id, user_id, title, message, kind, link, read, created_at",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Notification {} not found", notification_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn clear_notifications(&self, user_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}
