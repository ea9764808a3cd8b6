//! services/api/src/web/dto.rs
//!
//! JSON payloads shared by several handler modules, and their conversions
//! from core domain types.

use chrono::{DateTime, Utc};
use lms_core::domain::{
    AttendanceRecord, AttemptRecord, Category, Department, Lecture, QuizAttempt, User,
};
use lms_core::leaderboard::LeaderboardEntry;
use lms_core::policy::Role;
use lms_core::quiz::Score;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

pub fn role_name(role: Role) -> &'static str {
    match role {
        Role::Student => "student",
        Role::Teacher => "teacher",
        Role::Admin => "admin",
    }
}

fn percent(score: i32, total: i32) -> Option<f64> {
    Score { score, total }.percent()
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// `student`, `teacher` or `admin`.
    pub role: String,
    pub is_teacher: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub department_id: Option<Uuid>,
    pub date_joined: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: role_name(Role::of(&user)).to_string(),
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_teacher: user.is_teacher,
            is_superuser: user.is_superuser,
            is_active: user.is_active,
            department_id: user.department_id,
            date_joined: user.date_joined,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DepartmentResponse {
    pub id: Uuid,
    pub name: String,
}

impl From<Department> for DepartmentResponse {
    fn from(d: Department) -> Self {
        Self { id: d.id, name: d.name }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            slug: c.slug,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LectureResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub has_document: bool,
    pub order: i32,
    pub is_unlocked: bool,
    pub is_quiz_unlocked: bool,
    /// Both gates open.
    pub can_take_quiz: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Lecture> for LectureResponse {
    fn from(l: Lecture) -> Self {
        Self {
            can_take_quiz: l.can_take_quiz(),
            has_document: l.document_path.is_some(),
            id: l.id,
            title: l.title,
            description: l.description,
            category_id: l.category_id,
            department_id: l.department_id,
            order: l.order,
            is_unlocked: l.is_unlocked,
            is_quiz_unlocked: l.is_quiz_unlocked,
            created_at: l.created_at,
        }
    }
}

/// A scored attempt. `id` is absent for unsaved previews.
#[derive(Serialize, ToSchema)]
pub struct AttemptSummary {
    pub id: Option<Uuid>,
    pub lecture_id: Uuid,
    pub score: i32,
    pub total_questions: i32,
    /// Absent when the quiz had no questions.
    pub percent: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub is_official_attempt: bool,
}

impl From<QuizAttempt> for AttemptSummary {
    fn from(a: QuizAttempt) -> Self {
        Self {
            percent: percent(a.score, a.total_questions),
            id: a.id,
            lecture_id: a.lecture_id,
            score: a.score,
            total_questions: a.total_questions,
            timestamp: a.timestamp,
            is_official_attempt: a.is_official_attempt,
        }
    }
}

/// An attempt with the student's and lecture's names, for listings.
#[derive(Serialize, ToSchema)]
pub struct AttemptResponse {
    pub id: Option<Uuid>,
    pub student_id: Uuid,
    pub username: String,
    pub lecture_id: Uuid,
    pub lecture_title: String,
    pub score: i32,
    pub total_questions: i32,
    pub percent: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub is_official_attempt: bool,
}

impl From<AttemptRecord> for AttemptResponse {
    fn from(r: AttemptRecord) -> Self {
        let a = r.attempt;
        Self {
            percent: percent(a.score, a.total_questions),
            id: a.id,
            student_id: a.student_id,
            username: r.username,
            lecture_id: a.lecture_id,
            lecture_title: r.lecture_title,
            score: a.score,
            total_questions: a.total_questions,
            timestamp: a.timestamp,
            is_official_attempt: a.is_official_attempt,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceResponse {
    pub student_id: Uuid,
    pub username: String,
    pub lecture_id: Uuid,
    pub lecture_title: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

impl From<AttendanceRecord> for AttendanceResponse {
    fn from(r: AttendanceRecord) -> Self {
        Self {
            student_id: r.attendance.student_id,
            username: r.username,
            lecture_id: r.attendance.lecture_id,
            lecture_title: r.lecture_title,
            timestamp: r.attendance.timestamp,
            acknowledged: r.attendance.acknowledged,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeaderboardEntryResponse {
    pub rank: usize,
    pub user_id: Uuid,
    pub username: String,
    pub total_score: i64,
}

pub fn ranked(entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntryResponse> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| LeaderboardEntryResponse {
            rank: i + 1,
            user_id: e.user_id,
            username: e.username,
            total_score: e.total_score,
        })
        .collect()
}
