//! services/api/src/web/lectures.rs
//!
//! Student-facing lecture endpoints: the scoped listing, the lecture page,
//! attendance acknowledgment and the annotated-copy save.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use lms_core::domain::LectureFilter;
use lms_core::service;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{reject, HandlerError};
use crate::web::dto::{ranked, CategoryResponse, LeaderboardEntryResponse, LectureResponse};
use crate::web::state::{AppState, Session};

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Deserialize, IntoParams)]
pub struct LectureQuery {
    /// Case-insensitive search in title and description.
    pub q: Option<String>,
    /// Category slug.
    pub category: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LectureListResponse {
    pub lectures: Vec<LectureResponse>,
    pub categories: Vec<CategoryResponse>,
    pub current_category: Option<CategoryResponse>,
    /// Top students by official score in the caller's department.
    pub leaderboard: Vec<LeaderboardEntryResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct LectureDetailResponse {
    pub lecture: LectureResponse,
    /// The student's saved copy, else the rendered source document. Absent
    /// while the attendance gate or the content lock applies.
    pub content: Option<String>,
    pub has_attended: bool,
    pub show_attendance_gate: bool,
    pub content_locked: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceAck {
    pub lecture_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct NoteRequest {
    /// The full annotated HTML of the lecture.
    pub content: String,
}

#[derive(Serialize, ToSchema)]
pub struct NoteResponse {
    pub status: String,
    pub lecture_id: Uuid,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /lectures - Lectures in the caller's department
#[utoipa::path(
    get,
    path = "/lectures",
    params(LectureQuery),
    responses(
        (status = 200, description = "Scoped lecture listing", body = LectureListResponse),
        (status = 401, description = "Not signed in")
    ),
    tag = "lectures"
)]
pub async fn list_lectures_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<LectureQuery>,
) -> Result<Json<LectureListResponse>, HandlerError> {
    let filter = LectureFilter {
        query: query.q,
        category_slug: query.category,
    };
    let listing = service::lecture_list(state.db.as_ref(), &session.actor, &filter)
        .await
        .map_err(reject)?;
    Ok(Json(LectureListResponse {
        lectures: listing.lectures.into_iter().map(Into::into).collect(),
        categories: listing.categories.into_iter().map(Into::into).collect(),
        current_category: listing.current_category.map(Into::into),
        leaderboard: ranked(listing.leaderboard),
    }))
}

/// GET /lectures/{id} - A lecture page
#[utoipa::path(
    get,
    path = "/lectures/{id}",
    params(("id" = Uuid, Path, description = "Lecture id")),
    responses(
        (status = 200, description = "Lecture detail", body = LectureDetailResponse),
        (status = 403, description = "Lecture belongs to another department"),
        (status = 404, description = "No such lecture")
    ),
    tag = "lectures"
)]
pub async fn lecture_detail_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
) -> Result<Json<LectureDetailResponse>, HandlerError> {
    let view = service::lecture_detail(
        state.db.as_ref(),
        state.documents.as_ref(),
        &session.actor,
        lecture_id,
    )
    .await
    .map_err(reject)?;
    Ok(Json(LectureDetailResponse {
        lecture: view.lecture.into(),
        content: view.content,
        has_attended: view.has_attended,
        show_attendance_gate: view.show_attendance_gate,
        content_locked: view.content_locked,
    }))
}

/// POST /lectures/{id}/attendance - Acknowledge attendance
#[utoipa::path(
    post,
    path = "/lectures/{id}/attendance",
    params(("id" = Uuid, Path, description = "Lecture id")),
    responses(
        (status = 201, description = "Attendance registered", body = AttendanceAck),
        (status = 403, description = "Lecture belongs to another department"),
        (status = 404, description = "No such lecture")
    ),
    tag = "lectures"
)]
pub async fn attendance_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
) -> Result<(StatusCode, Json<AttendanceAck>), HandlerError> {
    let attendance = service::mark_attendance(state.db.as_ref(), &session.actor, lecture_id)
        .await
        .map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(AttendanceAck {
            lecture_id: attendance.lecture_id,
            timestamp: attendance.timestamp,
            acknowledged: attendance.acknowledged,
        }),
    ))
}

/// PUT /lectures/{id}/notes - Save the annotated copy of a lecture
#[utoipa::path(
    put,
    path = "/lectures/{id}/notes",
    params(("id" = Uuid, Path, description = "Lecture id")),
    request_body = NoteRequest,
    responses(
        (status = 200, description = "Note saved", body = NoteResponse),
        (status = 403, description = "Attendance required or wrong department"),
        (status = 404, description = "No such lecture")
    ),
    tag = "lectures"
)]
pub async fn save_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<NoteResponse>, HandlerError> {
    let note = service::save_note(state.db.as_ref(), &session.actor, lecture_id, &req.content)
        .await
        .map_err(reject)?;
    Ok(Json(NoteResponse {
        status: "success".to_string(),
        lecture_id: note.lecture_id,
    }))
}
