//! services/api/src/web/account.rs
//!
//! The caller's own profile and grades.

use axum::{extract::State, Extension, Json};
use lms_core::domain::ProfileUpdate;
use lms_core::service;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{reject, HandlerError};
use crate::web::dto::{AttemptResponse, UserResponse};
use crate::web::state::{AppState, Session};

#[derive(Deserialize, ToSchema)]
pub struct ProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// GET /me - The signed-in user's profile
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not signed in")
    ),
    tag = "account"
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<UserResponse>, HandlerError> {
    let user = state
        .db
        .get_user(session.actor.user_id)
        .await
        .map_err(reject)?;
    Ok(Json(user.into()))
}

/// PUT /me - Update the signed-in user's names and email
#[utoipa::path(
    put,
    path = "/me",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 401, description = "Not signed in")
    ),
    tag = "account"
)]
pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<UserResponse>, HandlerError> {
    let update = ProfileUpdate {
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        email: req.email.trim().to_string(),
    };
    let user = service::update_profile(state.db.as_ref(), &session.actor, update)
        .await
        .map_err(reject)?;
    Ok(Json(user.into()))
}

/// GET /me/grades - Every attempt of the signed-in user, newest first
#[utoipa::path(
    get,
    path = "/me/grades",
    responses(
        (status = 200, description = "Own attempts", body = [AttemptResponse]),
        (status = 401, description = "Not signed in")
    ),
    tag = "account"
)]
pub async fn my_grades_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<AttemptResponse>>, HandlerError> {
    let attempts = service::my_grades(state.db.as_ref(), &session.actor)
        .await
        .map_err(reject)?;
    Ok(Json(attempts.into_iter().map(Into::into).collect()))
}
