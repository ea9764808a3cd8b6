//! services/api/src/web/admin.rs
//!
//! User and department administration. Superusers only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use lms_core::domain::{NewUser, UserUpdate};
use lms_core::service;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{reject, HandlerError};
use crate::web::auth::hash_submitted_password;
use crate::web::dto::{DepartmentResponse, UserResponse};
use crate::web::state::{AppState, Session};

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_teacher: bool,
    #[serde(default)]
    pub is_superuser: bool,
    pub department_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_teacher: bool,
    pub is_active: bool,
    pub department_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct DepartmentRequest {
    pub name: String,
}

/// GET /admin/users - All users, newest first
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "Users", body = [UserResponse]),
        (status = 403, description = "Not an admin")
    ),
    tag = "admin"
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<UserResponse>>, HandlerError> {
    let users = service::list_users(state.db.as_ref(), &session.actor)
        .await
        .map_err(reject)?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// POST /admin/users - Create an account
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 403, description = "Not an admin"),
        (status = 409, description = "Username taken")
    ),
    tag = "admin"
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), HandlerError> {
    let hashed_password = hash_submitted_password(&req.password)?;
    let user = service::create_user(
        state.db.as_ref(),
        &session.actor,
        NewUser {
            username: req.username,
            email: req.email.trim().to_string(),
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            hashed_password,
            is_teacher: req.is_teacher,
            is_superuser: req.is_superuser,
            department_id: req.department_id,
        },
    )
    .await
    .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// PUT /admin/users/{id} - Edit an account
#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "No such user")
    ),
    tag = "admin"
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, HandlerError> {
    let user = service::update_user(
        state.db.as_ref(),
        &session.actor,
        user_id,
        UserUpdate {
            username: req.username,
            email: req.email.trim().to_string(),
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            is_teacher: req.is_teacher,
            is_active: req.is_active,
            department_id: req.department_id,
        },
    )
    .await
    .map_err(reject)?;
    Ok(Json(user.into()))
}

/// DELETE /admin/users/{id} - Delete an account and its records
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 403, description = "Not an admin")
    ),
    tag = "admin"
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    service::delete_user(state.db.as_ref(), &session.actor, user_id)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/users/{id}/password - Set a new password
#[utoipa::path(
    post,
    path = "/admin/users/{id}/password",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = PasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "No such user")
    ),
    tag = "admin"
)]
pub async fn set_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<PasswordRequest>,
) -> Result<StatusCode, HandlerError> {
    let hashed_password = hash_submitted_password(&req.password)?;
    service::set_password(state.db.as_ref(), &session.actor, user_id, &hashed_password)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/departments - All departments
#[utoipa::path(
    get,
    path = "/admin/departments",
    responses(
        (status = 200, description = "Departments", body = [DepartmentResponse]),
        (status = 403, description = "Not an admin")
    ),
    tag = "admin"
)]
pub async fn list_departments_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<DepartmentResponse>>, HandlerError> {
    let departments = service::list_departments(state.db.as_ref(), &session.actor)
        .await
        .map_err(reject)?;
    Ok(Json(departments.into_iter().map(Into::into).collect()))
}

/// POST /admin/departments - Create a department
#[utoipa::path(
    post,
    path = "/admin/departments",
    request_body = DepartmentRequest,
    responses(
        (status = 201, description = "Department created", body = DepartmentResponse),
        (status = 403, description = "Not an admin"),
        (status = 409, description = "Department already exists")
    ),
    tag = "admin"
)]
pub async fn create_department_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<DepartmentRequest>,
) -> Result<(StatusCode, Json<DepartmentResponse>), HandlerError> {
    let department = service::create_department(state.db.as_ref(), &session.actor, &req.name)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(department.into())))
}
