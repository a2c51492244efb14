//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;

/// Middleware that validates the bearer token and extracts the caller's
/// identity and role.
///
/// If valid, inserts an `AuthUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the Authorization header
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Parse the bearer token
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 3. Resolve the token to a user identity and role
    let auth_user = state.db.validate_auth_token(token).await.map_err(|e| {
        error!("Failed to validate auth token: {:?}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // 4. Insert the identity into request extensions
    req.extensions_mut().insert(auth_user);

    // 5. Continue to the handler
    Ok(next.run(req).await)
}
