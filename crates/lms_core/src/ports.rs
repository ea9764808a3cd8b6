//! crates/lms_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or mail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AnswerMap, Attendance, AttendanceRecord, AttemptRecord, Category, Department, Lecture,
    LectureFilter, LectureUpdate, NewAttempt, NewLecture, NewQuestion, NewUser, ProfileUpdate,
    Question, QuizAttempt, ScoreTotal, StudentNote, User, UserCredentials, UserUpdate,
};
use crate::policy::DepartmentScope;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, SMTP).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials>;

    /// All users, newest first.
    async fn list_users(&self) -> PortResult<Vec<User>>;

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User>;

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> PortResult<User>;

    async fn set_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()>;

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    /// Deletes the session and everything stashed under it.
    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Session-scoped quiz answers ---
    async fn stash_attempt_answers(
        &self,
        session_id: &str,
        attempt_id: Uuid,
        answers: &AnswerMap,
    ) -> PortResult<()>;

    /// Answers stashed by this session for the attempt, if any.
    async fn attempt_answers(&self, session_id: &str, attempt_id: Uuid)
        -> PortResult<Option<AnswerMap>>;

    // --- Departments & Categories ---
    async fn create_department(&self, name: &str) -> PortResult<Department>;

    async fn list_departments(&self) -> PortResult<Vec<Department>>;

    async fn create_category(&self, name: &str, slug: &str) -> PortResult<Category>;

    async fn list_categories(&self) -> PortResult<Vec<Category>>;

    async fn get_category_by_slug(&self, slug: &str) -> PortResult<Option<Category>>;

    // --- Lectures ---
    async fn create_lecture(&self, lecture: NewLecture) -> PortResult<Lecture>;

    async fn get_lecture(&self, lecture_id: Uuid) -> PortResult<Lecture>;

    async fn update_lecture(&self, lecture_id: Uuid, update: LectureUpdate) -> PortResult<Lecture>;

    async fn set_lecture_document(&self, lecture_id: Uuid, document_path: &str) -> PortResult<()>;

    /// Cascades to questions, choices, attempts, notes and attendance.
    async fn delete_lecture(&self, lecture_id: Uuid) -> PortResult<()>;

    /// Lectures visible in `scope`, ordered by `order` (by department first for `All`).
    async fn list_lectures(
        &self,
        scope: &DepartmentScope,
        filter: &LectureFilter,
    ) -> PortResult<Vec<Lecture>>;

    // --- Question bank ---
    async fn questions_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<Question>>;

    /// Atomically deletes the lecture's whole question bank and writes `questions`.
    /// Returns the number of questions written.
    async fn replace_question_bank(
        &self,
        lecture_id: Uuid,
        questions: Vec<NewQuestion>,
    ) -> PortResult<usize>;

    // --- Attempts ---
    /// Stores an attempt. The first attempt for a (student, lecture) pair is the
    /// official one; implementations must keep that true under concurrent calls.
    async fn record_attempt(&self, attempt: NewAttempt) -> PortResult<QuizAttempt>;

    async fn get_attempt(&self, attempt_id: Uuid) -> PortResult<QuizAttempt>;

    /// A student's attempts, newest first.
    async fn attempts_for_student(&self, student_id: Uuid) -> PortResult<Vec<AttemptRecord>>;

    /// A lecture's attempts, highest score first.
    async fn attempts_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<AttemptRecord>>;

    /// Attempts on lectures in scope, newest first, optionally matching a
    /// username or lecture title.
    async fn list_attempts(
        &self,
        scope: &DepartmentScope,
        query: Option<&str>,
    ) -> PortResult<Vec<AttemptRecord>>;

    /// Official-score totals for every student (non-teacher, non-admin) in scope.
    async fn official_score_totals(&self, scope: &DepartmentScope) -> PortResult<Vec<ScoreTotal>>;

    // --- Notes & Attendance ---
    async fn get_note(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<Option<StudentNote>>;

    async fn upsert_note(
        &self,
        student_id: Uuid,
        lecture_id: Uuid,
        content: &str,
    ) -> PortResult<StudentNote>;

    /// Get-or-create.
    async fn mark_attendance(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<Attendance>;

    async fn has_attended(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<bool>;

    async fn attendance_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<AttendanceRecord>>;

    /// Attendance on lectures in scope, newest first.
    async fn list_attendance(&self, scope: &DepartmentScope) -> PortResult<Vec<AttendanceRecord>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists a lecture's source document and returns the path to record on the lecture.
    async fn store(&self, lecture_id: Uuid, file_name: &str, data: &[u8]) -> PortResult<String>;

    /// Converts a stored document to displayable HTML.
    async fn render_html(&self, path: &str) -> PortResult<String>;
}

/// An outbound message with an HTML body and a plain-text fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait MailService: Send + Sync {
    /// Rejects a recipient the transport could never deliver to, with
    /// `PortError::Invalid`.
    fn check_recipient(&self, address: &str) -> PortResult<()>;

    async fn send(&self, mail: OutboundMail) -> PortResult<()>;
}
