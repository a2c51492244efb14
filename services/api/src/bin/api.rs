//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, RazorpayAdapter},
    config::Config,
    error::ApiError,
    web::{
        fanout::FanOut,
        middleware::require_auth,
        registry::ConnectionRegistry,
        rest::{
            admin_orders_handler, check_purchase_handler, clear_notifications_handler,
            create_gateway_order_handler, create_notification_handler, create_order_handler,
            list_notifications_handler, list_orders_handler, mark_all_read_handler,
            mark_read_handler, purchased_books_handler, unread_count_handler,
            verify_payment_handler, ApiDoc,
        },
        state::AppState,
        ws_handler,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter
        .run_migrations()
        .await
        .map_err(|e| ApiError::Internal(format!("Migration failed: {e}")))?;
    info!("Database migrations complete.");

    // --- 3. Initialize Adapters & the Push Channel ---
    let gateway = Arc::new(RazorpayAdapter::new(
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
        config.razorpay_base_url.clone(),
    ));

    let registry = Arc::new(ConnectionRegistry::new());
    let push = Arc::new(FanOut::new(db_adapter.clone(), registry.clone()));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        gateway,
        push,
        registry,
        config: config.clone(),
    });

    // --- 5. CORS: explicit origin allow-list ---
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Every route in this core requires authentication; the auth collaborator
    // issues the bearer tokens this middleware validates.
    let protected_routes = Router::new()
        .route("/payments/create-order", post(create_gateway_order_handler))
        .route("/payments/verify", post(verify_payment_handler))
        .route("/orders", post(create_order_handler).get(list_orders_handler))
        .route("/orders/admin", get(admin_orders_handler))
        .route("/orders/purchased-books", get(purchased_books_handler))
        .route("/orders/check-purchase/{book_id}", get(check_purchase_handler))
        .route(
            "/notifications",
            get(list_notifications_handler)
                .post(create_notification_handler)
                .delete(clear_notifications_handler),
        )
        .route("/notifications/unread-count", get(unread_count_handler))
        .route("/notifications/{id}/read", put(mark_read_handler))
        .route("/notifications/mark-all-read", put(mark_all_read_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
