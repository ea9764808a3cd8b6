//! services/api/src/web/quiz.rs
//!
//! Taking a quiz and reviewing the result.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use lms_core::quiz::QuestionReview;
use lms_core::service::{self, QuizOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{reject, HandlerError};
use crate::web::dto::AttemptSummary;
use crate::web::state::{AppState, Session};

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ChoiceResponse {
    pub id: Uuid,
    pub text: String,
}

/// A question as shown to the quiz taker; correctness is not revealed.
#[derive(Serialize, ToSchema)]
pub struct QuizQuestionResponse {
    pub id: Uuid,
    pub text: String,
    pub choices: Vec<ChoiceResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct QuizResponse {
    pub lecture_id: Uuid,
    pub lecture_title: String,
    pub questions: Vec<QuizQuestionResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitQuizRequest {
    /// Question id -> chosen choice id. Missing or foreign ids count as unanswered.
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionReviewResponse {
    pub question_id: Uuid,
    pub text: String,
    pub explanation: String,
    pub choices: Vec<ChoiceResponse>,
    pub user_choice: Option<Uuid>,
    pub correct_choice: Option<Uuid>,
    pub is_correct: bool,
}

impl From<QuestionReview> for QuestionReviewResponse {
    fn from(r: QuestionReview) -> Self {
        Self {
            question_id: r.question_id,
            text: r.text,
            explanation: r.explanation,
            choices: r
                .choices
                .into_iter()
                .map(|c| ChoiceResponse { id: c.id, text: c.text })
                .collect(),
            user_choice: r.user_choice,
            correct_choice: r.correct_choice,
            is_correct: r.is_correct,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuizOutcomeResponse {
    pub attempt: AttemptSummary,
    /// True for teacher and admin attempts, which are never stored.
    pub preview: bool,
    pub review: Vec<QuestionReviewResponse>,
}

impl From<QuizOutcome> for QuizOutcomeResponse {
    fn from(o: QuizOutcome) -> Self {
        Self {
            attempt: o.attempt.into(),
            preview: o.preview,
            review: o.review.into_iter().map(Into::into).collect(),
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /lectures/{id}/quiz - The lecture's questions
#[utoipa::path(
    get,
    path = "/lectures/{id}/quiz",
    params(("id" = Uuid, Path, description = "Lecture id")),
    responses(
        (status = 200, description = "Quiz questions", body = QuizResponse),
        (status = 403, description = "Quiz locked or wrong department"),
        (status = 404, description = "No such lecture")
    ),
    tag = "quiz"
)]
pub async fn quiz_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
) -> Result<Json<QuizResponse>, HandlerError> {
    let (lecture, questions) = service::quiz_questions(state.db.as_ref(), &session.actor, lecture_id)
        .await
        .map_err(reject)?;
    Ok(Json(QuizResponse {
        lecture_id: lecture.id,
        lecture_title: lecture.title,
        questions: questions
            .into_iter()
            .map(|q| QuizQuestionResponse {
                id: q.id,
                text: q.text,
                choices: q
                    .choices
                    .into_iter()
                    .map(|c| ChoiceResponse { id: c.id, text: c.text })
                    .collect(),
            })
            .collect(),
    }))
}

/// POST /lectures/{id}/quiz - Submit answers
///
/// Student attempts are stored; the first one per lecture is official.
#[utoipa::path(
    post,
    path = "/lectures/{id}/quiz",
    params(("id" = Uuid, Path, description = "Lecture id")),
    request_body = SubmitQuizRequest,
    responses(
        (status = 200, description = "Scored attempt with review", body = QuizOutcomeResponse),
        (status = 403, description = "Quiz locked or wrong department"),
        (status = 404, description = "No such lecture")
    ),
    tag = "quiz"
)]
pub async fn submit_quiz_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(lecture_id): Path<Uuid>,
    Json(req): Json<SubmitQuizRequest>,
) -> Result<Json<QuizOutcomeResponse>, HandlerError> {
    let outcome = service::submit_quiz(
        state.db.as_ref(),
        &session.actor,
        &session.id,
        lecture_id,
        &req.answers,
    )
    .await
    .map_err(reject)?;
    Ok(Json(outcome.into()))
}

/// GET /attempts/{id}/result - Review a stored attempt
///
/// Chosen answers are only shown to the session that submitted them.
#[utoipa::path(
    get,
    path = "/attempts/{id}/result",
    params(("id" = Uuid, Path, description = "Attempt id")),
    responses(
        (status = 200, description = "Attempt review", body = QuizOutcomeResponse),
        (status = 404, description = "No such attempt for this user")
    ),
    tag = "quiz"
)]
pub async fn quiz_result_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<QuizOutcomeResponse>, HandlerError> {
    let outcome = service::quiz_result(state.db.as_ref(), &session.actor, &session.id, attempt_id)
        .await
        .map_err(reject)?;
    Ok(Json(outcome.into()))
}
