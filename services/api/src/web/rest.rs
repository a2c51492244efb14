//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::adapters::receipt;
use crate::web::fanout::to_dto;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use bookstore_core::domain::{AuthUser, Book, NotificationKind, Order, PurchaseInput, Role};
use bookstore_core::notify::notify;
use bookstore_core::ports::PortError;
use bookstore_core::purchase::complete_purchase;
use chrono::{DateTime, Utc};
use push_channel::protocol::{NotificationDto, UnreadCountBody};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_gateway_order_handler,
        verify_payment_handler,
        create_order_handler,
        check_purchase_handler,
    ),
    components(
        schemas(
            CreateGatewayOrderRequest,
            GatewayOrderResponse,
            VerifyPaymentRequest,
            VerifyPaymentResponse,
            CreateOrderRequest,
            OrderResponse,
            CheckPurchaseResponse,
        )
    ),
    tags(
        (name = "Bookstore API", description = "Purchase and notification endpoints for the e-book storefront.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateGatewayOrderRequest {
    /// Amount in minor currency units (paise).
    pub amount: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct GatewayOrderResponse {
    pub order_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Serialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    /// Short-lived receipt that `POST /orders` requires; present only on success.
    pub receipt: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub book_id: Uuid,
    pub payment_id: String,
    pub order_id: String,
    pub amount: i64,
    pub payment_method: String,
    pub receipt: String,
}

#[derive(Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub payment_id: String,
    pub order_id: String,
    pub amount: i64,
    pub payment_method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl OrderResponse {
    fn from_domain(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            book_id: order.book_id,
            payment_id: order.gateway_payment_id,
            order_id: order.gateway_order_id,
            amount: order.amount_minor,
            payment_method: order.payment_method,
            status: order.status,
            created_at: order.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub price: i64,
    pub status: String,
}

impl BookResponse {
    fn from_domain(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            price: book.price_minor,
            status: book.status.as_str().to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CheckPurchaseResponse {
    pub is_purchased: bool,
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

#[derive(Serialize)]
pub struct ClearNotificationsResponse {
    pub deleted: u64,
}

#[derive(Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub link: Option<String>,
}

//=========================================================================================
// Error Mapping Helpers
//=========================================================================================

fn port_error(e: PortError) -> (StatusCode, String) {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Invalid(_) => StatusCode::BAD_REQUEST,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn require_admin(auth: &AuthUser) -> Result<(), (StatusCode, String)> {
    if auth.role == Role::Admin {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "Admin access required".to_string()))
    }
}

//=========================================================================================
// Payment Handlers
//=========================================================================================

/// Create a payment-gateway order for the given amount.
#[utoipa::path(
    post,
    path = "/payments/create-order",
    request_body = CreateGatewayOrderRequest,
    responses(
        (status = 201, description = "Gateway order created", body = GatewayOrderResponse),
        (status = 400, description = "Missing or non-positive amount"),
        (status = 502, description = "Payment gateway unavailable")
    )
)]
pub async fn create_gateway_order_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateGatewayOrderRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let amount = req.amount.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Amount is required".to_string(),
        )
    })?;

    let order_id = app_state
        .gateway
        .create_gateway_order(amount, "INR")
        .await
        .map_err(|e| match e {
            PortError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
            e => {
                error!("Failed to create gateway order: {:?}", e);
                (StatusCode::BAD_GATEWAY, "Payment gateway unavailable".to_string())
            }
        })?;

    Ok((StatusCode::CREATED, Json(GatewayOrderResponse { order_id })))
}

/// Verify a payment signature and issue a short-lived payment receipt.
#[utoipa::path(
    post,
    path = "/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Verification result", body = VerifyPaymentResponse)
    )
)]
pub async fn verify_payment_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let valid = app_state
        .gateway
        .verify_payment(
            &req.razorpay_order_id,
            &req.razorpay_payment_id,
            &req.razorpay_signature,
        )
        .await
        .map_err(port_error)?;

    let receipt = valid.then(|| {
        receipt::issue(
            &app_state.config.razorpay_key_secret,
            auth.user_id,
            &req.razorpay_order_id,
            &req.razorpay_payment_id,
            Utc::now(),
            app_state.config.receipt_ttl,
        )
    });

    Ok(Json(VerifyPaymentResponse {
        success: valid,
        receipt,
    }))
}

//=========================================================================================
// Order Handlers
//=========================================================================================

/// Record a verified purchase: order, entitlement, and notification fan-out.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order recorded", body = OrderResponse),
        (status = 200, description = "Order already recorded for this payment", body = OrderResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Missing, expired, or mismatched payment receipt")
    )
)]
pub async fn create_order_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.amount <= 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Amount must be a positive integer of minor units".to_string(),
        ));
    }

    // The receipt binds this call to a successful /payments/verify by the
    // same user for the same gateway payment.
    let receipt_ok = receipt::verify(
        &app_state.config.razorpay_key_secret,
        &req.receipt,
        auth.user_id,
        &req.order_id,
        &req.payment_id,
        Utc::now(),
    );
    if !receipt_ok {
        return Err((
            StatusCode::FORBIDDEN,
            "Payment receipt invalid or expired".to_string(),
        ));
    }

    let input = PurchaseInput {
        user_id: auth.user_id,
        book_id: req.book_id,
        gateway_payment_id: req.payment_id,
        gateway_order_id: req.order_id,
        amount_minor: req.amount,
        payment_method: req.payment_method,
    };

    let outcome = complete_purchase(&app_state.db, &app_state.push, input)
        .await
        .map_err(|e| {
            error!("Failed to complete purchase: {:?}", e);
            port_error(e)
        })?;

    let status = if outcome.already_recorded {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(OrderResponse::from_domain(outcome.order))))
}

/// List the caller's orders.
pub async fn list_orders_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let orders = app_state
        .db
        .orders_for_user(auth.user_id)
        .await
        .map_err(port_error)?;
    Ok(Json(
        orders
            .into_iter()
            .map(OrderResponse::from_domain)
            .collect::<Vec<_>>(),
    ))
}

/// List every order (admin only).
pub async fn admin_orders_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&auth)?;
    let orders = app_state.db.all_orders().await.map_err(port_error)?;
    Ok(Json(
        orders
            .into_iter()
            .map(OrderResponse::from_domain)
            .collect::<Vec<_>>(),
    ))
}

/// List the books the caller has purchased.
pub async fn purchased_books_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let books = app_state
        .db
        .purchased_books(auth.user_id)
        .await
        .map_err(port_error)?;
    Ok(Json(
        books
            .into_iter()
            .map(BookResponse::from_domain)
            .collect::<Vec<_>>(),
    ))
}

/// Check whether the caller owns a specific book.
#[utoipa::path(
    get,
    path = "/orders/check-purchase/{book_id}",
    responses(
        (status = 200, description = "Purchase state", body = CheckPurchaseResponse)
    ),
    params(
        ("book_id" = Uuid, Path, description = "The book to check.")
    )
)]
pub async fn check_purchase_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(book_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let entitlement = app_state
        .db
        .entitlement_for(auth.user_id, book_id)
        .await
        .map_err(port_error)?;
    Ok(Json(CheckPurchaseResponse {
        is_purchased: entitlement.map(|e| e.is_purchased).unwrap_or(false),
    }))
}

//=========================================================================================
// Notification Handlers
//=========================================================================================

/// List the caller's notifications, newest first, capped at 50.
pub async fn list_notifications_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let items = app_state
        .db
        .notifications_for_user(auth.user_id)
        .await
        .map_err(port_error)?;
    Ok(Json(
        items.iter().map(to_dto).collect::<Vec<NotificationDto>>(),
    ))
}

/// Current unread count for the caller.
pub async fn unread_count_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let count = app_state
        .db
        .unread_count(auth.user_id)
        .await
        .map_err(port_error)?;
    Ok(Json(UnreadCountBody { count }))
}

/// Mark one of the caller's notifications as read.
pub async fn mark_read_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let notification = app_state
        .db
        .mark_notification_read(notification_id, auth.user_id)
        .await
        .map_err(port_error)?;
    app_state.push.push_state(auth.user_id).await;
    Ok(Json(to_dto(&notification)))
}

/// Mark all of the caller's notifications as read.
pub async fn mark_all_read_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let updated = app_state
        .db
        .mark_all_read(auth.user_id)
        .await
        .map_err(port_error)?;
    app_state.push.push_state(auth.user_id).await;
    Ok(Json(MarkAllReadResponse { updated }))
}

/// Delete all of the caller's notifications.
pub async fn clear_notifications_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let deleted = app_state
        .db
        .clear_notifications(auth.user_id)
        .await
        .map_err(port_error)?;
    if deleted == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            "No notifications to clear".to_string(),
        ));
    }
    app_state.push.push_state(auth.user_id).await;
    Ok(Json(ClearNotificationsResponse { deleted }))
}

/// Create a notification for any user (admin only).
pub async fn create_notification_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&auth)?;

    let kind = NotificationKind::parse(&req.kind).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a valid notification kind", req.kind),
        )
    })?;

    let notification = notify(
        &app_state.db,
        &app_state.push,
        req.user_id,
        &req.title,
        &req.message,
        kind,
        req.link.as_deref(),
    )
    .await
    .map_err(|e| {
        error!("Failed to create notification: {:?}", e);
        port_error(e)
    })?;

    Ok((StatusCode::CREATED, Json(to_dto(&notification))))
}
