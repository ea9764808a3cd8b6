//! services/api/src/web/teacher.rs
//!
//! Teacher and admin tooling: lecture authoring, document and question-bank
//! uploads, categories, results, attendance and emailed reports.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use lms_core::domain::NewLecture;
use lms_core::ports::PortError;
use lms_core::service;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::adapters::spreadsheet::decode_sheet;
use crate::error::{reject, HandlerError};
use crate::web::dto::{AttemptResponse, AttendanceResponse, CategoryResponse, LectureResponse};
use crate::web::state::{AppState, Session};

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LectureRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<Uuid>,
    /// Only honoured for admins; teachers always author into their own department.
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub is_quiz_unlocked: bool,
}

impl From<LectureRequest> for NewLecture {
    fn from(r: LectureRequest) -> Self {
        NewLecture {
            title: r.title,
            description: r.description,
            category_id: r.category_id,
            department_id: r.department_id,
            order: r.order,
            is_unlocked: r.is_unlocked,
            is_quiz_unlocked: r.is_quiz_unlocked,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CategoryRequest {
    pub name: String,
}

#[derive(Serialize, ToSchema)]
pub struct RejectedRowResponse {
    /// 1-based sheet row, header included.
    pub row: usize,
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct ImportResponse {
    pub imported: usize,
    pub rejected: Vec<RejectedRowResponse>,
    pub message: String,
}

#[derive(Deserialize, IntoParams)]
pub struct ResultsQuery {
    /// Matches usernames and lecture titles.
    pub q: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct QuizResultsResponse {
    pub official: Vec<AttemptResponse>,
    pub retries: Vec<AttemptResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct EmailReportRequest {
    pub lecture_id: Uuid,
    pub recipient: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ReportDeliveryResponse {
    pub sent: bool,
    pub message: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Reads the first file part of a multipart upload.
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), HandlerError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        debug!(file = %name, bytes = data.len(), "upload received");
        return Ok((name, data.to_vec()));
    }
    Err((
        StatusCode::BAD_REQUEST,
        "Multipart form must include a file".to_string(),
    ))
}

//=========================================================================================
// Lectures
//=========================================================================================

/// GET /teacher/lectures - Lectures the caller manages
#[utoipa::path(
    get,
    path = "/teacher/lectures",
    responses(
        (status = 200, description = "Managed lectures", body = [LectureResponse]),
        (status = 403, description = "Not a teacher or admin")
    ),
    tag = "teacher"
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<LectureResponse>>, HandlerError> {
    let lectures = service::teacher_dashboard(state.db.as_ref(), &session.actor)
        .await
        .map_err(reject)?;
    Ok(Json(lectures.into_iter().map(Into::into).collect()))
}

/// POST /teacher/lectures - Create a lecture
#[utoipa::path(
    post,
    path = "/teacher/lectures",
    request_body = LectureRequest,
    responses(
        (status = 201, description = "Lecture created", body = LectureResponse),
        (status = 400, description = "Invalid lecture"),
        (status = 403, description = "Not a teacher or admin")
    ),
    tag = "teacher"
)]
pub async fn create_lecture_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<LectureRequest>,
) -> Result<(StatusCode, Json<LectureResponse>), HandlerError> {
    let lecture = service::create_lecture(state.db.as_ref(), &session.actor, req.into())
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(lecture.into())))
}

/// PUT /teacher/lectures/{id} - Replace a lecture's editable fields
#[utoipa::path(
    put,
    path = "/teacher/lectures/{id}",
    params(("id" = Uuid, Path, description = "Lecture id")),
    request_body = LectureRequest,
    responses(
        (status = 200, description = "Lecture updated", body = LectureResponse),
        (status = 403, description = "Lecture managed by another department"),
        (status = 404, description = "No such lecture")
    ),
    tag = "teacher"
)]
pub async fn update_lecture_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
    Json(req): Json<LectureRequest>,
) -> Result<Json<LectureResponse>, HandlerError> {
    let lecture = service::update_lecture(state.db.as_ref(), &session.actor, lecture_id, req.into())
        .await
        .map_err(reject)?;
    Ok(Json(lecture.into()))
}

/// DELETE /teacher/lectures/{id} - Delete a lecture and everything attached to it
#[utoipa::path(
    delete,
    path = "/teacher/lectures/{id}",
    params(("id" = Uuid, Path, description = "Lecture id")),
    responses(
        (status = 204, description = "Lecture deleted"),
        (status = 403, description = "Lecture managed by another department"),
        (status = 404, description = "No such lecture")
    ),
    tag = "teacher"
)]
pub async fn delete_lecture_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    service::delete_lecture(state.db.as_ref(), &session.actor, lecture_id)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /teacher/lectures/{id}/document - Upload the source document
#[utoipa::path(
    put,
    path = "/teacher/lectures/{id}/document",
    params(("id" = Uuid, Path, description = "Lecture id")),
    request_body(content_type = "multipart/form-data", description = "A .docx, .txt or .html file."),
    responses(
        (status = 200, description = "Document stored", body = LectureResponse),
        (status = 400, description = "Missing or unsupported file"),
        (status = 403, description = "Lecture managed by another department")
    ),
    tag = "teacher"
)]
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<LectureResponse>, HandlerError> {
    let (file_name, data) = read_upload(&mut multipart).await?;
    let lecture = service::attach_document(
        state.db.as_ref(),
        state.documents.as_ref(),
        &session.actor,
        lecture_id,
        &file_name,
        &data,
    )
    .await
    .map_err(reject)?;
    Ok(Json(lecture.into()))
}

/// POST /teacher/lectures/{id}/questions/import - Replace the question bank from a sheet
#[utoipa::path(
    post,
    path = "/teacher/lectures/{id}/questions/import",
    params(("id" = Uuid, Path, description = "Lecture id")),
    request_body(content_type = "multipart/form-data", description = "An .xlsx, .xls, .ods or .csv file."),
    responses(
        (status = 200, description = "Question bank replaced", body = ImportResponse),
        (status = 400, description = "Unreadable spreadsheet"),
        (status = 403, description = "Lecture managed by another department")
    ),
    tag = "teacher"
)]
pub async fn import_questions_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, HandlerError> {
    service::managed_lecture(state.db.as_ref(), &session.actor, lecture_id)
        .await
        .map_err(reject)?;
    let (file_name, data) = read_upload(&mut multipart).await?;
    let rows = tokio::task::spawn_blocking(move || decode_sheet(&file_name, &data))
        .await
        .map_err(|e| reject(PortError::Unexpected(format!("spreadsheet decoding panicked: {e}"))))?
        .map_err(reject)?;
    let report = service::import_question_bank(state.db.as_ref(), &session.actor, lecture_id, &rows)
        .await
        .map_err(reject)?;
    Ok(Json(ImportResponse {
        message: format!("Successfully imported {} questions.", report.imported),
        imported: report.imported,
        rejected: report
            .rejected
            .into_iter()
            .map(|r| RejectedRowResponse {
                row: r.row,
                reason: r.reason.to_string(),
            })
            .collect(),
    }))
}

//=========================================================================================
// Categories & reports
//=========================================================================================

/// POST /teacher/categories - Create a category
#[utoipa::path(
    post,
    path = "/teacher/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 409, description = "Category already exists")
    ),
    tag = "teacher"
)]
pub async fn create_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), HandlerError> {
    let category = service::create_category(state.db.as_ref(), &session.actor, &req.name)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

/// GET /teacher/results - Official attempts and retries in the caller's scope
#[utoipa::path(
    get,
    path = "/teacher/results",
    params(ResultsQuery),
    responses(
        (status = 200, description = "Quiz results", body = QuizResultsResponse),
        (status = 403, description = "Not a teacher or admin")
    ),
    tag = "teacher"
)]
pub async fn results_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<QuizResultsResponse>, HandlerError> {
    let results = service::quiz_results(state.db.as_ref(), &session.actor, query.q.as_deref())
        .await
        .map_err(reject)?;
    Ok(Json(QuizResultsResponse {
        official: results.official.into_iter().map(Into::into).collect(),
        retries: results.retries.into_iter().map(Into::into).collect(),
    }))
}

/// GET /teacher/attendance - Attendance in the caller's scope, newest first
#[utoipa::path(
    get,
    path = "/teacher/attendance",
    responses(
        (status = 200, description = "Attendance records", body = [AttendanceResponse]),
        (status = 403, description = "Not a teacher or admin")
    ),
    tag = "teacher"
)]
pub async fn attendance_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<AttendanceResponse>>, HandlerError> {
    let records = service::attendance_report(state.db.as_ref(), &session.actor)
        .await
        .map_err(reject)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// POST /teacher/reports/email - Mail a lecture's attendance and best scores
///
/// A delivery failure is reported with `sent: false`, not as an error status.
#[utoipa::path(
    post,
    path = "/teacher/reports/email",
    request_body = EmailReportRequest,
    responses(
        (status = 200, description = "Delivery outcome", body = ReportDeliveryResponse),
        (status = 400, description = "Invalid recipient"),
        (status = 403, description = "Lecture managed by another department")
    ),
    tag = "teacher"
)]
pub async fn email_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<EmailReportRequest>,
) -> Result<Json<ReportDeliveryResponse>, HandlerError> {
    let delivery = service::send_lecture_report(
        state.db.as_ref(),
        state.mailer.as_ref(),
        &session.actor,
        req.lecture_id,
        &req.recipient,
        &req.message,
    )
    .await
    .map_err(reject)?;
    Ok(Json(ReportDeliveryResponse {
        sent: delivery.sent,
        message: delivery.message,
    }))
}
