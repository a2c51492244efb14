//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::registry::ConnectionRegistry;
use bookstore_core::ports::{DatabaseService, NotificationPush, PaymentGatewayService};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub gateway: Arc<dyn PaymentGatewayService>,
    /// Fan-out seam; the registry below is its connection table.
    pub push: Arc<dyn NotificationPush>,
    pub registry: Arc<ConnectionRegistry>,
    pub config: Arc<Config>,
}
