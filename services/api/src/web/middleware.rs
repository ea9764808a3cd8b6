//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use lms_core::service;
use std::sync::Arc;
use tracing::debug;

use crate::error::{reject, HandlerError};
use crate::web::state::{AppState, Session};

/// Extracts the auth session id from the `session` cookie.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the auth session cookie and resolves the caller.
///
/// If valid, inserts a [`Session`] into request extensions for handlers to use.
/// If the cookie is missing, expired, or belongs to a deactivated account,
/// returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HandlerError> {
    let unauthorized = || (StatusCode::UNAUTHORIZED, "Unauthorized".to_string());

    // 1. Parse session ID from cookie
    let session_id = session_cookie(req.headers())
        .ok_or_else(unauthorized)?
        .to_string();

    // 2. Validate auth session, get user_id
    let user_id = state
        .db
        .validate_auth_session(&session_id)
        .await
        .map_err(|e| {
            debug!("Rejected auth session: {}", e);
            unauthorized()
        })?;

    // 3. Resolve the caller's role and department
    let actor = service::resolve_actor(state.db.as_ref(), user_id)
        .await
        .map_err(reject)?;

    req.extensions_mut().insert(Session {
        id: session_id,
        actor,
    });
    Ok(next.run(req).await)
}
