//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for login and logout, plus password hashing.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use lms_core::policy::Role;
use lms_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{reject, HandlerError};
use crate::web::dto::role_name;
use crate::web::middleware::session_cookie;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub username: String,
    /// `student`, `teacher` or `admin`.
    pub role: String,
}

//=========================================================================================
// Password hashing
//=========================================================================================

/// Hashes a password with Argon2 and a fresh salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Hashes a password submitted through the API, rejecting blank ones.
pub fn hash_submitted_password(password: &str) -> Result<String, HandlerError> {
    if password.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Password is required.".to_string()));
    }
    hash_password(password).map_err(|e| {
        error!("Failed to hash password: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to hash password".to_string(),
        )
    })
}

fn verify_password(password: &str, hashed: &str) -> Result<bool, HandlerError> {
    let parsed_hash = PasswordHash::new(hashed).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication error".to_string(),
        )
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        )
    };

    // 1. Get user by username
    let creds = match state.db.get_user_by_username(req.username.trim()).await {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => return Err(invalid()),
        Err(e) => return Err(reject(e)),
    };

    // 2. Verify password; deactivated accounts cannot sign in
    if !verify_password(&req.password, &creds.hashed_password)? || !creds.is_active {
        warn!(username = %creds.username, "failed login");
        return Err(invalid());
    }
    let user = state.db.get_user(creds.user_id).await.map_err(reject)?;

    // 3. Create the auth session
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(state.config.session_ttl_days);
    state
        .db
        .create_auth_session(&auth_session_id, user.id, Utc::now() + ttl)
        .await
        .map_err(reject)?;

    // 4. Create session cookie
    let cookie = format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        auth_session_id,
        ttl.num_seconds()
    );
    info!(username = %user.username, "user logged in");

    let response = AuthResponse {
        user_id: user.id,
        username: user.username.clone(),
        role: role_name(Role::of(&user)).to_string(),
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let auth_session_id = session_cookie(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    // Stashed quiz answers go with the session.
    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(reject)?;

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_passwords_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn blank_passwords_are_refused() {
        let (status, _) = hash_submitted_password("   ").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
